use shared::protocol::CommandRecord;

use crate::render::PageRenderer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Fill { target: String, color: String },
    /// Marks where the amendments of a resumed page begin.
    Resume,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    time_ms: u64,
}

impl Command {
    fn new(kind: CommandKind) -> Self {
        Self { kind, time_ms: 0 }
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn time_ms(&self) -> u64 {
        self.time_ms
    }

    pub fn toggle(&mut self, onset_ms: u64, now_ms: u64) {
        self.time_ms = now_ms.saturating_sub(onset_ms);
    }

    pub fn apply<R: PageRenderer>(&self, renderer: &mut R) {
        if let CommandKind::Fill { target, color } = &self.kind {
            renderer.fill(target, color);
        }
    }

    pub fn to_record(&self) -> CommandRecord {
        match &self.kind {
            CommandKind::Fill { target, color } => CommandRecord::Fill {
                target: target.clone(),
                color: color.clone(),
                time: self.time_ms,
            },
            CommandKind::Resume => CommandRecord::Resume { time: self.time_ms },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    commands: Vec<Command>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fill is painted here and nowhere else.
    pub fn fill<R: PageRenderer>(
        &mut self,
        target: impl Into<String>,
        color: impl Into<String>,
        onset_ms: u64,
        now_ms: u64,
        renderer: &mut R,
    ) -> &Command {
        let mut command = Command::new(CommandKind::Fill {
            target: target.into(),
            color: color.into(),
        });
        command.toggle(onset_ms, now_ms);
        command.apply(renderer);
        self.push(command)
    }

    pub fn resume(&mut self, onset_ms: u64, now_ms: u64) -> &Command {
        let mut command = Command::new(CommandKind::Resume);
        command.toggle(onset_ms, now_ms);
        self.push(command)
    }

    fn push(&mut self, command: Command) -> &Command {
        self.commands.push(command);
        &self.commands[self.commands.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn serialize(&self) -> Vec<CommandRecord> {
        self.commands.iter().map(Command::to_record).collect()
    }
}

#[cfg(test)]
#[path = "tests/command_log_tests.rs"]
mod tests;

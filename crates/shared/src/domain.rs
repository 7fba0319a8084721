use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One sentence+image page of a survey.
///
/// Pages are identified by their position in [`SurveyDescriptor::pages`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub name: String,
    pub text: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    /// Regions that count as a correct answer when scoring this page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_targets: Vec<String>,
}

/// Everything the client needs to run a survey, as served by `GET /book/{survey}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyDescriptor {
    pub pages: Vec<Page>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub sounds: Vec<String>,
    #[serde(default)]
    pub simultaneous: bool,
    /// Milliseconds between showing the sentence and showing the image.
    #[serde(default)]
    pub duration: u64,
}

impl SurveyDescriptor {
    pub fn sentence_image_delay(&self) -> Duration {
        if self.simultaneous {
            Duration::ZERO
        } else {
            Duration::from_millis(self.duration)
        }
    }

    /// Every asset the pages refer to, images first, without duplicates.
    pub fn asset_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let referenced = self
            .pages
            .iter()
            .flat_map(|page| std::iter::once(&page.image).chain(page.audio.iter()));
        for name in self.images.iter().chain(self.sounds.iter()).chain(referenced) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(image: &str, audio: Option<&str>) -> Page {
        Page {
            name: image.to_string(),
            text: "De kat is rood.".to_string(),
            image: image.to_string(),
            audio: audio.map(str::to_string),
            expected_targets: Vec::new(),
        }
    }

    #[test]
    fn simultaneous_surveys_have_no_sentence_delay() {
        let mut descriptor = SurveyDescriptor {
            pages: vec![page("cat.svg", None)],
            images: Vec::new(),
            sounds: Vec::new(),
            simultaneous: true,
            duration: 6000,
        };
        assert_eq!(descriptor.sentence_image_delay(), Duration::ZERO);

        descriptor.simultaneous = false;
        assert_eq!(descriptor.sentence_image_delay(), Duration::from_millis(6000));
    }

    #[test]
    fn asset_names_are_deduplicated() {
        let descriptor = SurveyDescriptor {
            pages: vec![page("cat.svg", Some("cat.mp3")), page("dog.svg", None)],
            images: vec!["cat.svg".to_string()],
            sounds: vec!["cat.mp3".to_string()],
            simultaneous: false,
            duration: 0,
        };
        assert_eq!(
            descriptor.asset_names(),
            vec!["cat.svg", "cat.mp3", "dog.svg"]
        );
    }

    #[test]
    fn descriptor_defaults_optional_fields() {
        let descriptor: SurveyDescriptor = serde_json::from_str(
            r#"{"pages":[{"text":"a","image":"a.svg"}]}"#,
        )
        .expect("descriptor");
        assert!(!descriptor.simultaneous);
        assert_eq!(descriptor.pages[0].audio, None);
        assert!(descriptor.pages[0].expected_targets.is_empty());
    }
}

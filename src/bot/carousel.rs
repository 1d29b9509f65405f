//! Candidate carousel composition
//!
//! Turns recognition candidates into a carousel: a random sample of at most
//! [`CAROUSEL_MAX_COLUMNS`] columns, each with a source link, an accept
//! button and a reject button.

use super::{ACCEPT_LABEL, DETAILS_LABEL, REJECT_LABEL, REJECT_TEXT};
use crate::config::{CAROUSEL_MAX_COLUMNS, CAROUSEL_TEXT_MAX_CHARS, CAROUSEL_TITLE_MAX_CHARS};
use crate::crypto::ThumbnailSigner;
use crate::platform::messages::{CarouselColumn, CarouselTemplate, TemplateAction};
use crate::postback::PostbackAction;
use crate::recognizer::InferenceCandidate;
use crate::utils::truncate_with_ellipsis;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Url;
use thiserror::Error;

/// Errors raised while composing a carousel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CarouselError {
    /// Nothing to show
    #[error("no candidates to compose")]
    EmptyCandidateSet,
    /// A carousel needs at least one column
    #[error("invalid column limit: {0}")]
    InvalidColumnLimit(usize),
    /// Thumbnail proxy URL could not be built
    #[error("invalid thumbnail url: {0}")]
    InvalidThumbnailUrl(String),
}

/// Builds candidate carousels
#[derive(Debug, Clone)]
pub struct CarouselComposer {
    thumbnail_base_url: String,
    thumbnail_signer: ThumbnailSigner,
    reject_via_postback: bool,
}

impl CarouselComposer {
    /// Create a composer.
    ///
    /// # Arguments
    ///
    /// * `thumbnail_base_url` - Public URL of the thumbnail proxy endpoint
    /// * `thumbnail_signer` - Signs the image URLs handed to the proxy
    /// * `reject_via_postback` - Send rejections as postbacks instead of text
    #[must_use]
    pub fn new(
        thumbnail_base_url: impl Into<String>,
        thumbnail_signer: ThumbnailSigner,
        reject_via_postback: bool,
    ) -> Self {
        Self {
            thumbnail_base_url: thumbnail_base_url.into(),
            thumbnail_signer,
            reject_via_postback,
        }
    }

    /// Compose a carousel from a random sample of `candidates`.
    ///
    /// The sample holds `min(max_columns, candidates.len())` distinct
    /// candidates in random order; `max_columns` is capped at the platform
    /// limit.
    ///
    /// # Errors
    ///
    /// Returns `CarouselError::EmptyCandidateSet` when `candidates` is empty
    /// and `CarouselError::InvalidColumnLimit` when `max_columns` is zero.
    pub fn compose<R: Rng + ?Sized>(
        &self,
        candidates: &[InferenceCandidate],
        max_columns: usize,
        rng: &mut R,
    ) -> Result<CarouselTemplate, CarouselError> {
        if candidates.is_empty() {
            return Err(CarouselError::EmptyCandidateSet);
        }
        if max_columns == 0 {
            return Err(CarouselError::InvalidColumnLimit(max_columns));
        }

        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.shuffle(rng);
        let count = max_columns.min(CAROUSEL_MAX_COLUMNS).min(candidates.len());

        let columns = order[..count]
            .iter()
            .map(|&i| self.column(&candidates[i]))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CarouselTemplate { columns })
    }

    fn column(&self, candidate: &InferenceCandidate) -> Result<CarouselColumn, CarouselError> {
        let reject = if self.reject_via_postback {
            TemplateAction::Postback {
                label: REJECT_LABEL.to_string(),
                data: PostbackAction::Reject {
                    face_id: candidate.face_id,
                    inference_id: candidate.inference_id,
                }
                .encode(),
                display_text: Some(REJECT_TEXT.to_string()),
            }
        } else {
            TemplateAction::Message {
                label: REJECT_LABEL.to_string(),
                text: REJECT_TEXT.to_string(),
            }
        };

        Ok(CarouselColumn {
            thumbnail_image_url: self.thumbnail_url(&candidate.photo_image_url)?,
            title: column_title(candidate),
            text: column_text(candidate),
            actions: [
                TemplateAction::Uri {
                    label: DETAILS_LABEL.to_string(),
                    uri: candidate.photo_source_url.clone(),
                },
                TemplateAction::Postback {
                    label: ACCEPT_LABEL.to_string(),
                    data: PostbackAction::Accept {
                        face_id: candidate.face_id,
                        inference_id: candidate.inference_id,
                    }
                    .encode(),
                    display_text: None,
                },
                reject,
            ],
        })
    }

    fn thumbnail_url(&self, image_url: &str) -> Result<String, CarouselError> {
        let sig = self.thumbnail_signer.sign(image_url);
        Url::parse_with_params(
            &self.thumbnail_base_url,
            &[("image_url", image_url), ("sig", sig.as_str())],
        )
        .map(String::from)
        .map_err(|e| CarouselError::InvalidThumbnailUrl(e.to_string()))
    }
}

fn column_title(candidate: &InferenceCandidate) -> String {
    let mut title = format!(
        "{}:[{:.5}] {}",
        candidate.face_id, candidate.score, candidate.label_name
    );
    if let Some(description) = &candidate.label_description {
        title.push_str(&format!(" ({})", description.replace("\r\n", ", ")));
    }
    truncate_with_ellipsis(&title, CAROUSEL_TITLE_MAX_CHARS)
}

/// Shown when neither a caption nor a label name is available
const EMPTY_TEXT_PLACEHOLDER: &str = "-";

// The platform rejects columns with blank text
fn column_text(candidate: &InferenceCandidate) -> String {
    let caption = candidate.photo_caption.replace('\n', " ");
    let text = [caption.as_str(), candidate.label_name.as_str()]
        .into_iter()
        .find(|t| !t.trim().is_empty())
        .unwrap_or(EMPTY_TEXT_PLACEHOLDER);
    truncate_with_ellipsis(text, CAROUSEL_TEXT_MAX_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn candidate(n: u32) -> InferenceCandidate {
        InferenceCandidate {
            inference_id: 100 + n,
            face_id: n,
            label_id: 1,
            label_name: format!("Label {n}"),
            label_description: None,
            score: 0.5,
            photo_caption: format!("caption {n}"),
            photo_image_url: format!("https://img.example.com/f/{n}.jpg?size=s&v=1"),
            photo_source_url: format!("https://example.com/p/{n}"),
        }
    }

    fn signer() -> ThumbnailSigner {
        match ThumbnailSigner::new(b"secret") {
            Ok(signer) => signer,
            Err(e) => panic!("signer: {e}"),
        }
    }

    fn composer() -> CarouselComposer {
        CarouselComposer::new("https://bot.example.com/thumbnail", signer(), false)
    }

    #[test]
    fn test_eight_candidates_give_five_columns() -> Result<(), CarouselError> {
        let candidates: Vec<_> = (0..8).map(candidate).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let mut orderings = HashSet::new();

        for _ in 0..20 {
            let carousel = composer().compose(&candidates, 5, &mut rng)?;
            assert_eq!(carousel.columns.len(), 5);

            let faces: Vec<String> = carousel
                .columns
                .iter()
                .map(|c| c.title.split(':').next().unwrap_or_default().to_string())
                .collect();
            let distinct: HashSet<_> = faces.iter().collect();
            assert_eq!(distinct.len(), 5);
            orderings.insert(faces);
        }
        assert!(orderings.len() > 1, "sampling never varied");
        Ok(())
    }

    #[test]
    fn test_fewer_candidates_than_columns() -> Result<(), CarouselError> {
        let candidates: Vec<_> = (0..2).map(candidate).collect();
        let carousel = composer().compose(&candidates, 5, &mut StdRng::seed_from_u64(1))?;
        assert_eq!(carousel.columns.len(), 2);
        Ok(())
    }

    #[test]
    fn test_column_limit_is_capped() -> Result<(), CarouselError> {
        let candidates: Vec<_> = (0..9).map(candidate).collect();
        let carousel = composer().compose(&candidates, 50, &mut StdRng::seed_from_u64(1))?;
        assert_eq!(carousel.columns.len(), CAROUSEL_MAX_COLUMNS);
        Ok(())
    }

    #[test]
    fn test_empty_candidates() {
        assert_eq!(
            composer().compose(&[], 5, &mut StdRng::seed_from_u64(1)),
            Err(CarouselError::EmptyCandidateSet)
        );
        assert_eq!(
            composer().compose(&[candidate(1)], 0, &mut StdRng::seed_from_u64(1)),
            Err(CarouselError::InvalidColumnLimit(0))
        );
    }

    #[test]
    fn test_column_contents() -> Result<(), CarouselError> {
        let mut c = candidate(42);
        c.inference_id = 17;
        c.score = 0.123_456_789;
        c.label_description = Some("idol\r\nsinger".to_string());
        c.photo_caption = "line1\nline2".to_string();

        let carousel = composer().compose(&[c], 5, &mut StdRng::seed_from_u64(1))?;
        let column = &carousel.columns[0];
        assert_eq!(column.title, "42:[0.12346] Label 42 (idol, singer)");
        assert_eq!(column.text, "line1 line2");
        let image_url = "https://img.example.com/f/42.jpg?size=s&v=1";
        assert_eq!(
            column.thumbnail_image_url,
            format!(
                "https://bot.example.com/thumbnail?image_url=https%3A%2F%2Fimg.example.com%2Ff%2F42.jpg%3Fsize%3Ds%26v%3D1&sig={}",
                signer().sign(image_url)
            )
        );
        assert_eq!(
            column.actions,
            [
                TemplateAction::Uri {
                    label: DETAILS_LABEL.to_string(),
                    uri: "https://example.com/p/42".to_string(),
                },
                TemplateAction::Postback {
                    label: ACCEPT_LABEL.to_string(),
                    data: "action=accept&face=42&inference=17".to_string(),
                    display_text: None,
                },
                TemplateAction::Message {
                    label: REJECT_LABEL.to_string(),
                    text: REJECT_TEXT.to_string(),
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn test_reject_via_postback() -> Result<(), CarouselError> {
        let composer = CarouselComposer::new("https://bot.example.com/thumbnail", signer(), true);
        let carousel = composer.compose(&[candidate(3)], 5, &mut StdRng::seed_from_u64(1))?;
        match &carousel.columns[0].actions[2] {
            TemplateAction::Postback { data, .. } => {
                assert_eq!(
                    data.parse::<PostbackAction>(),
                    Ok(PostbackAction::Reject {
                        face_id: 3,
                        inference_id: 103
                    })
                );
            }
            other => panic!("unexpected reject action {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_thumbnail_url_carries_valid_signature() -> Result<(), CarouselError> {
        let carousel = composer().compose(&[candidate(9)], 5, &mut StdRng::seed_from_u64(1))?;
        let url = Url::parse(&carousel.columns[0].thumbnail_image_url)
            .map_err(|e| CarouselError::InvalidThumbnailUrl(e.to_string()))?;
        let param = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default()
        };

        assert_eq!(param("image_url"), "https://img.example.com/f/9.jpg?size=s&v=1");
        assert!(signer().verify(&param("image_url"), &param("sig")));
        assert!(!signer().verify("https://img.example.com/f/8.jpg", &param("sig")));
        Ok(())
    }

    #[test]
    fn test_blank_caption_falls_back() -> Result<(), CarouselError> {
        let mut c = candidate(5);
        c.photo_caption = " \n ".to_string();
        let carousel = composer().compose(&[c.clone()], 5, &mut StdRng::seed_from_u64(1))?;
        assert_eq!(carousel.columns[0].text, "Label 5");

        c.label_name = String::new();
        let carousel = composer().compose(&[c], 5, &mut StdRng::seed_from_u64(1))?;
        assert_eq!(carousel.columns[0].text, EMPTY_TEXT_PLACEHOLDER);
        Ok(())
    }

    #[test]
    fn test_long_title_and_text_are_truncated() -> Result<(), CarouselError> {
        let mut c = candidate(1);
        c.label_name = "名".repeat(80);
        c.photo_caption = "写".repeat(80);

        let carousel = composer().compose(&[c], 5, &mut StdRng::seed_from_u64(1))?;
        let column = &carousel.columns[0];
        assert_eq!(column.title.chars().count(), CAROUSEL_TITLE_MAX_CHARS);
        assert!(column.title.ends_with('…'));
        assert_eq!(column.text.chars().count(), CAROUSEL_TEXT_MAX_CHARS);
        assert!(column.text.ends_with('…'));
        Ok(())
    }
}

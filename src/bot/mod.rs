/// Candidate carousel composition
pub mod carousel;
/// Per-event dispatch and the accept/reject flow
pub mod router;

pub use carousel::{CarouselComposer, CarouselError};
pub use router::{EventRouter, Outcome, RouterError, RouterOptions};

/// Text a user sends (or the reject button sends for them) to decline a candidate
pub const REJECT_TEXT: &str = "ちがうよ";
/// Reply after any failed action
pub const FAILURE_TEXT: &str = "処理できませんでした😞";
/// Reply when recognition found nobody
pub const NO_CANDIDATES_TEXT: &str = "候補が見つかりませんでした🤔";

/// Label of the button opening the photo source
pub const DETAILS_LABEL: &str = "🔍 くわしく";
/// Label of the accept button
pub const ACCEPT_LABEL: &str = "🙆 あってる";
/// Label of the reject button
pub const REJECT_LABEL: &str = "🙅 ちがうよ";

/// Reply after an inference was accepted.
#[must_use]
pub fn accepted_text(face_id: u32) -> String {
    format!("ID:{face_id} を更新しました 🙆")
}

/// Reply after an inference was rejected.
#[must_use]
pub fn rejected_text(face_id: u32) -> String {
    format!("ID:{face_id} を更新しました 🙅")
}

//! Canned reply texts

use crate::media::RehostedLink;

/// Sent when a sender exceeds the hourly message allowance
pub const THROTTLED: &str = "⏳ You're sending messages too fast. Please try again later.";

/// Sent to unconfirmed senders whose text is not a confirmation phrase
pub const FOLLOW_PROMPT: &str =
    "Please follow me on Instagram, then reply with 'I follow' to start using this bot.";

/// Sent once a sender confirms
pub const FOLLOW_THANKS: &str =
    "Thanks for following! Send me an Instagram Reels link to download.";

/// Sent to confirmed senders whose message has no reel link
pub const HELP: &str = "Send me an Instagram Reels link to download.";

/// Sent when the reel page or video could not be retrieved
pub const DOWNLOAD_FAILED: &str = "⚠️ Couldn't download the video.";

/// Sent when the file host rejected the upload
pub const UPLOAD_FAILED: &str = "⚠️ Failed to upload video.";

/// Reply carrying the rehosted link
#[must_use]
pub fn video_link(link: &RehostedLink) -> String {
    format!("🎥 Here's your video: {link}")
}

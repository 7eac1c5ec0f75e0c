//! Textos de estado enviados al canal de texto de cada sesión.

use serenity::model::id::ChannelId;
use std::time::Duration;

use crate::audio::queue::TrackQueue;
use crate::audio::track::TrackDescriptor;
use crate::error::MusicError;

const QUEUE_PAGE: usize = 10;

pub fn now_playing(track: &TrackDescriptor) -> String {
    format!("▶ Now playing: **{}**{}", track.title, duration_suffix(track))
}

pub fn track_added(track: &TrackDescriptor) -> String {
    format!("Added **{}** to the queue.", track.title)
}

pub fn playlist_added(name: &str, count: usize) -> String {
    format!("Added playlist **{}** with {} tracks to the queue.", name, count)
}

pub fn joined(channel_id: ChannelId) -> String {
    format!("Joined <#{}>", channel_id)
}

pub fn skipped(track: &TrackDescriptor) -> String {
    format!("⏭ Skipped **{}**.", track.title)
}

pub fn nothing_playing() -> String {
    "No music playing.".to_string()
}

pub fn stopped() -> String {
    "⏹ Stopped and left voice channel.".to_string()
}

pub fn left() -> String {
    "Left the voice channel.".to_string()
}

pub fn paused() -> String {
    "⏸ Paused.".to_string()
}

pub fn resumed() -> String {
    "▶ Resumed.".to_string()
}

pub fn volume_set(volume: u8) -> String {
    format!("🔊 Volume set to {}%", volume)
}

pub fn queue_ended() -> String {
    "Queue ended, leaving voice channel.".to_string()
}

pub fn track_failed(track: &TrackDescriptor, cause: &str) -> String {
    format!("⚠ Could not play **{}**: {}", track.title, cause)
}

pub fn missing_query() -> String {
    "Provide a URL or search term.".to_string()
}

/// Actual + las primeras pistas en espera
pub fn queue_listing(current: Option<&TrackDescriptor>, queue: &TrackQueue) -> String {
    let mut out = String::new();
    match current {
        Some(track) => out.push_str(&format!("Now playing: **{}**\n", track.title)),
        None => out.push_str("Nothing is playing.\n"),
    }

    if queue.is_empty() {
        out.push_str("The queue is empty.");
        return out;
    }

    for (i, track) in queue.iter().take(QUEUE_PAGE).enumerate() {
        out.push_str(&format!("{}. {}{}\n", i + 1, track.title, duration_suffix(track)));
    }
    if queue.size() > QUEUE_PAGE {
        out.push_str(&format!("…and {} more\n", queue.size() - QUEUE_PAGE));
    }
    out.push_str(&format!(
        "**Total: {} tracks ({})**",
        queue.size(),
        format_duration(queue.total_duration())
    ));
    out
}

/// Un único mensaje por error, sin detalles internos del nodo
pub fn error_message(err: &MusicError) -> String {
    match err {
        MusicError::NoVoiceChannel => {
            "You must be in a voice channel (or mention a user in a voice channel).".to_string()
        }
        MusicError::SessionGone => nothing_playing(),
        MusicError::NoMatch => "No tracks found.".to_string(),
        MusicError::Resolution(cause) => format!("Could not load tracks: {}", cause),
        MusicError::Validation(reason) => reason.clone(),
        MusicError::NodeUnavailable(_) => {
            "The audio node is unavailable right now, try again later.".to_string()
        }
    }
}

fn duration_suffix(track: &TrackDescriptor) -> String {
    match track.duration {
        Some(duration) => format!(" ({})", format_duration(duration)),
        None => " (🔴 live)".to_string(),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(212)), "3:32");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1:02:03");
    }

    #[test]
    fn test_queue_listing_truncates() {
        let mut queue = TrackQueue::new();
        for i in 0..12 {
            queue.add(TrackDescriptor::sample(&format!("t{}", i)));
        }

        let listing = queue_listing(None, &queue);
        assert!(listing.starts_with("Nothing is playing."));
        assert!(listing.contains("10. t9"));
        assert!(!listing.contains("t10 ("));
        assert!(listing.contains("…and 2 more"));
        assert!(listing.contains("Total: 12 tracks (36:00)"));
    }

    #[test]
    fn test_error_messages_are_user_facing() {
        assert_eq!(error_message(&MusicError::NoMatch), "No tracks found.");
        // Un motivo que empiece igual no se confunde con "sin resultados"
        assert_eq!(
            error_message(&MusicError::Resolution("No tracks could be decoded".to_string())),
            "Could not load tracks: No tracks could be decoded"
        );
        assert_eq!(
            error_message(&MusicError::Validation("Volume must be between 0 and 100.".to_string())),
            "Volume must be between 0 and 100."
        );
        assert!(!error_message(&MusicError::NodeUnavailable("http://secret:2333".to_string()))
            .contains("secret"));
    }
}

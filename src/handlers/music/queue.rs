//! Track queue — the playback state the `/m` commands and panel buttons
//! operate on. No audio is decoded; a track is only its title and source.

use std::collections::VecDeque;

use reqwest::Url;

/// Queries that are not URLs are searched on YouTube.
const SEARCH_PREFIX: &str = "ytsearch:";
/// Lines of the up-next list shown before collapsing to "and k more...".
const MAX_LISTED: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    /// What the player would load: a URL or a `ytsearch:` query.
    pub source: String,
}

impl Track {
    /// `None` for a blank query.
    pub fn from_query(query: &str) -> Option<Self> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        let source = if Url::parse(query).is_ok() {
            query.to_string()
        } else {
            format!("{SEARCH_PREFIX}{query}")
        };
        Some(Self { title: query.to_string(), source })
    }
}

#[derive(Debug, Clone)]
pub struct TrackQueue {
    current: Option<Track>,
    up_next: VecDeque<Track>,
    volume: u8,
    paused: bool,
    restarts: u32,
}

impl TrackQueue {
    pub fn new(volume: u8) -> Self {
        Self { current: None, up_next: VecDeque::new(), volume, paused: false, restarts: 0 }
    }

    /// Start `track` if idle, otherwise append it.
    pub fn enqueue(&mut self, track: Track) {
        if self.current.is_none() {
            self.current = Some(track);
        } else {
            self.up_next.push_back(track);
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.up_next.is_empty()
    }

    pub fn len(&self) -> usize {
        self.up_next.len()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
    }

    /// Start the current track over: playback resumes from the top, so a
    /// paused track is unpaused. Returns it, if any.
    pub fn restart(&mut self) -> Option<&Track> {
        if self.current.is_some() {
            self.paused = false;
            self.restarts += 1;
        }
        self.current.as_ref()
    }

    /// Times the current track has been started over.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Replace the current track with the next one. Returns the skipped track.
    pub fn skip(&mut self) -> Option<Track> {
        let next = self.up_next.pop_front();
        self.restarts = 0;
        std::mem::replace(&mut self.current, next)
    }

    pub fn clear(&mut self) {
        self.up_next.clear();
    }

    /// Empty the queue and stop playback.
    pub fn reset(&mut self) {
        self.clear();
        self.current = None;
        self.paused = false;
        self.restarts = 0;
    }

    /// Description line of the now-playing panel.
    pub fn now_playing(&self) -> String {
        self.current
            .as_ref()
            .map(|t| format!("`{}`", t.title))
            .unwrap_or_default()
    }

    /// The up-next list as shown on the panel.
    pub fn up_next_text(&self) -> String {
        if self.up_next.is_empty() {
            return "There are no songs left in the queue".to_string();
        }
        let mut text = self
            .up_next
            .iter()
            .take(MAX_LISTED)
            .map(|t| format!(":small_blue_diamond: {}", t.title))
            .collect::<Vec<_>>()
            .join("\n");
        let more = self.up_next.len().saturating_sub(MAX_LISTED);
        if more > 0 {
            text.push_str(&format!("\nand {more} more..."));
        }
        text
    }
}

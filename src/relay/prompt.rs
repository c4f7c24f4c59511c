//! Password prompt detection in backend output

/// Watches backend output for the password prompt marker
///
/// The tail of each chunk is carried over so a marker split across two
/// reads is still found. Once the marker has been seen the detector goes
/// quiet for the rest of the session.
#[derive(Debug)]
pub struct PromptDetector {
    marker: String,
    tail: String,
    seen: bool,
}

impl PromptDetector {
    /// Create a detector for the given marker text
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            tail: String::new(),
            seen: false,
        }
    }

    /// Whether the marker has been seen
    pub fn seen(&self) -> bool {
        self.seen
    }

    /// Feed a chunk of backend output
    ///
    /// Returns `true` only for the chunk in which the marker first appears.
    pub fn observe(&mut self, chunk: &[u8]) -> bool {
        if self.seen || self.marker.is_empty() {
            return false;
        }

        let mut window = std::mem::take(&mut self.tail);
        window.push_str(&String::from_utf8_lossy(chunk));

        if window.contains(&self.marker) {
            self.seen = true;
            return true;
        }

        let keep = self.marker.chars().count() - 1;
        let skip = window.chars().count().saturating_sub(keep);
        self.tail = window.chars().skip(skip).collect();
        false
    }
}

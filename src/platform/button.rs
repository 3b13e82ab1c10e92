//! User button gesture detection.
//!
//! Turns raw pressed/released samples into [`UserRequest`]s:
//! - hold for [`HOLD_MS`]: [`UserRequest::SendPosition`], once per press
//! - two short clicks within [`DOUBLE_CLICK_GAP_MS`]: [`UserRequest::ResetSession`]

use super::UserRequest;

/// Press duration that counts as a hold.
pub const HOLD_MS: u64 = 500;

/// Maximum release-to-press gap between the clicks of a double click.
pub const DOUBLE_CLICK_GAP_MS: u64 = 400;

/// Debounced gesture decoder. Feed it every loop iteration.
#[derive(Debug, Default, Clone)]
pub struct ButtonDecoder {
    pressed_at: Option<u64>,
    hold_reported: bool,
    last_click_at: Option<u64>,
}

impl ButtonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one sample of the button level at `now_ms`.
    pub fn update(&mut self, pressed: bool, now_ms: u64) -> Option<UserRequest> {
        match (pressed, self.pressed_at) {
            (true, None) => {
                self.pressed_at = Some(now_ms);
                self.hold_reported = false;
                None
            }
            (true, Some(since)) => {
                if !self.hold_reported && now_ms.saturating_sub(since) >= HOLD_MS {
                    self.hold_reported = true;
                    self.last_click_at = None;
                    return Some(UserRequest::SendPosition);
                }
                None
            }
            (false, Some(_)) => {
                self.pressed_at = None;
                if self.hold_reported {
                    return None;
                }
                match self.last_click_at {
                    Some(prev) if now_ms.saturating_sub(prev) <= DOUBLE_CLICK_GAP_MS => {
                        self.last_click_at = None;
                        Some(UserRequest::ResetSession)
                    }
                    _ => {
                        self.last_click_at = Some(now_ms);
                        None
                    }
                }
            }
            (false, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click(decoder: &mut ButtonDecoder, at: u64) -> Option<UserRequest> {
        assert_eq!(decoder.update(true, at), None);
        decoder.update(false, at + 80)
    }

    #[test]
    fn test_hold_reports_once() {
        let mut decoder = ButtonDecoder::new();
        assert_eq!(decoder.update(true, 0), None);
        assert_eq!(decoder.update(true, 499), None);
        assert_eq!(decoder.update(true, 500), Some(UserRequest::SendPosition));
        assert_eq!(decoder.update(true, 900), None);
        assert_eq!(decoder.update(false, 1000), None);
    }

    #[test]
    fn test_double_click() {
        let mut decoder = ButtonDecoder::new();
        assert_eq!(click(&mut decoder, 0), None);
        assert_eq!(click(&mut decoder, 300), Some(UserRequest::ResetSession));
    }

    #[test]
    fn test_slow_clicks_are_not_double() {
        let mut decoder = ButtonDecoder::new();
        assert_eq!(click(&mut decoder, 0), None);
        assert_eq!(click(&mut decoder, 1_000), None);
        assert_eq!(click(&mut decoder, 1_300), Some(UserRequest::ResetSession));
    }

    #[test]
    fn test_hold_after_click_is_not_double() {
        let mut decoder = ButtonDecoder::new();
        assert_eq!(click(&mut decoder, 0), None);
        assert_eq!(decoder.update(true, 200), None);
        assert_eq!(decoder.update(true, 700), Some(UserRequest::SendPosition));
        assert_eq!(decoder.update(false, 800), None);
    }
}

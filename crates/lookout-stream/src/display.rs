//! HighGUI window showing annotated frames.

use opencv::core::Mat;
use opencv::highgui;

const KEY_ESC: i32 = 27;

/// True for `q`, `Q` or ESC. `wait_key` returns -1 when nothing was pressed.
pub fn is_quit_key(key: i32) -> bool {
    if key < 0 {
        return false;
    }
    let low = key & 0xFF;
    low == i32::from(b'q') || low == i32::from(b'Q') || low == KEY_ESC
}

/// A named display window; destroyed with every other HighGUI window on drop.
pub struct Window {
    title: String,
}

impl Window {
    pub fn open(title: &str) -> opencv::Result<Self> {
        highgui::named_window(title, highgui::WINDOW_AUTOSIZE)?;
        tracing::debug!(title, "display window opened");
        Ok(Self {
            title: title.to_string(),
        })
    }

    pub fn show(&self, frame: &Mat) -> opencv::Result<()> {
        highgui::imshow(&self.title, frame)
    }

    /// Pump window events for up to `wait_ms` and report whether quit was requested.
    pub fn poll_quit(&self, wait_ms: i32) -> opencv::Result<bool> {
        let key = highgui::wait_key(wait_ms)?;
        Ok(is_quit_key(key))
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_all_windows() {
            tracing::warn!(error = %e, "destroying windows failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_keys() {
        assert!(is_quit_key(b'q' as i32));
        assert!(is_quit_key(b'Q' as i32));
        assert!(is_quit_key(KEY_ESC));
        // Some backends report modifier bits above the low byte.
        assert!(is_quit_key(0x10_0000 | b'q' as i32));
    }

    #[test]
    fn test_other_keys_do_not_quit() {
        assert!(!is_quit_key(-1));
        assert!(!is_quit_key(b'a' as i32));
        assert!(!is_quit_key(b' ' as i32));
    }
}

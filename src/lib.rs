use std::time::Duration;

pub mod config;
pub mod coordinator;
pub mod domain;
pub mod player;
pub mod presenter;
pub mod session;

pub use config::Config;
pub use coordinator::InterruptionCoordinator;
pub use player::EngineHandle;
pub use presenter::NowPlayingPresenter;
pub use session::SessionStore;

// ~30fps control-loop tick
pub const REFRESH_RATE: Duration = Duration::from_millis(33);

/// Coerce a raw seconds value to something safe to do arithmetic with.
/// Backends occasionally report NaN or negative positions mid-seek.
pub fn sanitize_seconds(raw: f64) -> f64 {
    if raw.is_finite() && raw >= 0.0 { raw } else { 0.0 }
}

pub enum DurationStyle {
    Clean,
    Compact,
}

pub fn get_readable_duration(duration: Duration, style: DurationStyle) -> String {
    let mut secs = duration.as_secs();
    let mins = secs / 60;
    secs %= 60;

    match style {
        DurationStyle::Clean => match mins {
            0 => format!("{secs:02}s"),
            _ => format!("{mins}m {secs:02}s"),
        },
        DurationStyle::Compact => format!("{mins}:{secs:02}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_non_finite_and_negative() {
        assert_eq!(sanitize_seconds(f64::NAN), 0.0);
        assert_eq!(sanitize_seconds(f64::INFINITY), 0.0);
        assert_eq!(sanitize_seconds(f64::NEG_INFINITY), 0.0);
        assert_eq!(sanitize_seconds(-3.5), 0.0);
        assert_eq!(sanitize_seconds(42.25), 42.25);
    }

    #[test]
    fn readable_duration_formats() {
        let d = Duration::from_secs(754);
        assert_eq!(get_readable_duration(d, DurationStyle::Compact), "12:34");
        assert_eq!(get_readable_duration(d, DurationStyle::Clean), "12m 34s");
    }
}

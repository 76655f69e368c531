use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Whole seconds since the Unix epoch, saturating to zero for pre-epoch clocks
pub fn unix_second(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Time elapsed from `earlier` to `later`, zero if the clock went backwards
pub fn elapsed_between(earlier: SystemTime, later: SystemTime) -> Duration {
    later.duration_since(earlier).unwrap_or_default()
}

/// Auto-detect the first capture node offering the format for `kind`
#[cfg(feature = "v4l2")]
pub fn auto_detect_device(kind: crate::capture::CaptureKind) -> crate::error::Result<String> {
    use std::path::Path;

    use tracing::info;
    use v4l::{capability::Flags, video::Capture, Device};

    use crate::capture::v4l2::fourcc_for;
    use crate::error::BridgeError;

    info!("Auto-detecting {} capture device...", kind);
    let wanted = fourcc_for(kind);

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }
        if let Ok(formats) = dev.enum_formats() {
            if formats.iter().any(|fmt| fmt.fourcc == wanted) {
                info!("Found {} device: {} - {}", kind, path, caps.card);
                return Ok(path);
            }
        }
    }

    Err(BridgeError::Device(format!(
        "no capture device offers {} frames",
        kind
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_second_truncates() {
        let t = UNIX_EPOCH + Duration::from_millis(5_999);
        assert_eq!(unix_second(t), 5);
        assert_eq!(unix_second(UNIX_EPOCH - Duration::from_secs(1)), 0);
    }

    #[test]
    fn elapsed_between_clamps_negative() {
        let a = UNIX_EPOCH + Duration::from_secs(10);
        let b = UNIX_EPOCH + Duration::from_secs(12);
        assert_eq!(elapsed_between(a, b), Duration::from_secs(2));
        assert_eq!(elapsed_between(b, a), Duration::ZERO);
    }
}

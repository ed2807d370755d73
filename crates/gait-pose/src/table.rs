//! Pose-data table (CSV) rendering.

use std::borrow::Cow;
use std::fmt::Write;

use gait_models::FrameRecord;

pub const HEADER: &str = "frame,landmark,x,y,z,visibility,interpolated,bucket,strategy";

/// One row per frame and landmark. Undetected frames keep their rows with
/// zero visibility and an empty strategy.
pub fn render_pose_table(records: &[FrameRecord]) -> String {
    let mut out = String::with_capacity(64 * (records.len() * 33 + 1));
    out.push_str(HEADER);
    out.push('\n');

    for record in records {
        let strategy = csv_field(record.strategy.as_deref().unwrap_or(""));
        for lm in record.landmarks.iter() {
            // Writing to a String cannot fail
            let _ = writeln!(
                out,
                "{},{},{:.6},{:.6},{:.6},{:.4},{},{},{}",
                record.index,
                lm.id,
                lm.x,
                lm.y,
                lm.z,
                lm.visibility,
                lm.interpolated,
                record.bucket,
                strategy,
            );
        }
    }
    out
}

/// Quote a free-text field when it contains a separator, quote or line
/// break, doubling embedded quotes.
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains(|c| matches!(c, ',' | '"' | '\n' | '\r')) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

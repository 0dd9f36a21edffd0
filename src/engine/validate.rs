use crate::limits::*;
use crate::model::*;

use super::BookingError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Turn caller-supplied bounds into a window: strictly ordered, inside the
/// supported timestamp range, and not absurdly wide.
pub(crate) fn validate_window(start: Ms, end: Ms) -> Result<Span, BookingError> {
    let span = Span::try_new(start, end).ok_or(BookingError::InvalidWindow { start, end })?;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(BookingError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(BookingError::LimitExceeded("window too wide"));
    }
    Ok(span)
}

/// Empty or whitespace-only notes are stored as `None`.
pub(crate) fn normalize_notes(notes: Option<String>) -> Result<Option<String>, BookingError> {
    match notes {
        Some(n) if n.len() > MAX_NOTES_LEN => Err(BookingError::LimitExceeded("notes too long")),
        Some(n) if n.trim().is_empty() => Ok(None),
        other => Ok(other),
    }
}

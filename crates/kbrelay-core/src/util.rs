use std::path::Path;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

const TEXT_EXTENSIONS: [&str; 13] = [
  "txt", "md", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "csv", "html", "htm", "xml",
];

pub fn format_size(size_in_bytes: usize) -> String {
  if size_in_bytes < 1_000 {
    format!("{}B", size_in_bytes)
  } else if size_in_bytes < 1_000_000 {
    format!("{:.2}KB", size_in_bytes as f64 / 1e3)
  } else if size_in_bytes < 1_000_000_000 {
    format!("{:.2}MB", size_in_bytes as f64 / 1e6)
  } else {
    format!("{:.2}GB", size_in_bytes as f64 / 1e9)
  }
}

/// Current time at a fixed offset; out-of-range offsets fall back to UTC.
pub fn local_now(offset_hours: i8) -> OffsetDateTime {
  let offset = UtcOffset::from_hms(offset_hours, 0, 0).unwrap_or(UtcOffset::UTC);

  OffsetDateTime::now_utc().to_offset(offset)
}

/// `YYYYMMDDhhmmss`, appended to names to mint local knowledge-base ids.
pub fn compact_timestamp(at: OffsetDateTime) -> anyhow::Result<String> {
  let format = format_description!("[year][month][day][hour][minute][second]");

  Ok(at.format(&format)?)
}

pub fn date_dir(at: OffsetDateTime) -> anyhow::Result<String> {
  let format = format_description!("[year]-[month]-[day]");

  Ok(at.format(&format)?)
}

/// Documents the provider can extract or vectorize, recognised by extension.
pub fn is_text_file(filename: &str) -> bool {
  Path::new(filename)
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      TEXT_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext))
    })
    .unwrap_or(false)
}

//! Collision-resistant, filesystem-safe file names for the transient store.
//!
//! Both store areas are flat and shared by every in-flight request, so the
//! name is the only thing keeping two requests apart. A name is the
//! sanitised base, an underscore, a random hex suffix, and the original
//! extension: `Quarterly Report.docx` → `Quarterly_Report_9f86d081884c.docx`.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Hex characters appended to every stored name (48 random bits).
pub const SUFFIX_LEN: usize = 12;

/// Base name used when sanitising leaves nothing behind.
pub const FALLBACK_STEM: &str = "file";

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.-]").unwrap());

/// `_<suffix>` followed by an extension, a derived-name tail or the end.
static SUFFIXED: Lazy<Regex> = Lazy::new(|| Regex::new(r"_[0-9a-f]{12}(?:[._]|$)").unwrap());

/// Reduce an arbitrary client-supplied name to a safe single path component.
///
/// Non-ASCII characters are dropped, path separators and whitespace runs
/// become `_`, anything outside `[A-Za-z0-9_.-]` is removed, and leading or
/// trailing dots and underscores are stripped, so `../../etc/passwd` becomes
/// `etc_passwd`. May return an empty string.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    UNSAFE_CHARS
        .replace_all(&joined, "")
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// A fresh random suffix of [`SUFFIX_LEN`] lower-case hex characters.
pub fn unique_suffix() -> String {
    let mut hex = uuid::Uuid::new_v4().simple().to_string();
    hex.truncate(SUFFIX_LEN);
    hex
}

/// Derive a unique, safe stored name from a client-supplied file name.
///
/// The extension is taken from the raw name before sanitising so that a
/// name like `отчёт.pdf` still ends in `.pdf` (as `file_<hex>.pdf`). Never
/// fails.
pub fn unique_filename(name: &str) -> String {
    let last = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(name);

    let (raw_stem, raw_ext) = match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.trim_matches('.').is_empty() && !ext.is_empty() => {
            (stem, Some(ext))
        }
        _ => (last, None),
    };

    let mut stem = secure_filename(raw_stem);
    if stem.is_empty() {
        stem = FALLBACK_STEM.to_string();
    }

    let ext: Option<String> = raw_ext
        .map(|e| e.chars().filter(char::is_ascii_alphanumeric).collect::<String>())
        .filter(|e| !e.is_empty());

    let unique = match ext {
        Some(ext) => format!("{stem}_{}.{ext}", unique_suffix()),
        None => format!("{stem}_{}", unique_suffix()),
    };
    debug!("Stored name for {:?}: {}", name, unique);
    unique
}

/// Whether `name` carries a suffix from [`unique_suffix`], i.e. was named by
/// the store rather than by someone else sharing the directory.
///
/// Stored inputs, every artifact derived from them (`<stem>_images.zip`,
/// `<stem>_split.zip`, ...) and merge outputs all qualify.
pub fn has_unique_suffix(name: &str) -> bool {
    SUFFIXED.is_match(name)
}

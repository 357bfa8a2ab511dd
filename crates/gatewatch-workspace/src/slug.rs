//! Composite URL slugs: `<kebab-name>-<id>`.
//!
//! The trailing `-`-separated segment is the unique identifier; everything
//! before it is a human-readable name that plays no part in lookups. Ids
//! are lowercase alphanumeric, at least [`MIN_ID_LEN`] characters, and
//! start with a kind prefix (`o` for organizations, `p` for projects), so
//! `acme-prod-p7f3ka92x` names the project `p7f3ka92x`.

use thiserror::Error;

/// Minimum length of the embedded identifier segment, prefix included.
pub const MIN_ID_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugKind {
    Organization,
    Project,
}

impl SlugKind {
    #[must_use]
    pub fn prefix(self) -> char {
        match self {
            Self::Organization => 'o',
            Self::Project => 'p',
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Project => "project",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlugError {
    #[error("slug_empty")]
    Empty,
    /// No `-` separator, so there is no identifier segment to extract.
    #[error("slug_missing_separator:{slug}")]
    MissingSeparator { slug: String },
    #[error("slug_id_too_short:{id}")]
    IdTooShort { id: String },
    #[error("slug_bad_charset:{id}")]
    BadCharset { id: String },
    #[error("slug_wrong_prefix:{id}:expected_{expected}")]
    WrongPrefix { id: String, expected: char },
}

/// A successfully decoded composite slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSlug {
    /// The human-readable part; cosmetic only.
    pub name: String,
    /// The embedded unique identifier, prefix included.
    pub id: String,
}

/// Build the canonical slug for a name/id pair. The name is kebab-cased;
/// the id is appended verbatim as the final segment.
#[must_use]
pub fn encode_slug(name: &str, id: &str) -> String {
    let kebab = kebab_case(name);
    if kebab.is_empty() {
        id.to_string()
    } else {
        format!("{kebab}-{id}")
    }
}

/// Extract and validate the identifier embedded in `slug`.
///
/// Validation happens entirely here, before any lookup: a malformed slug
/// must classify as malformed even when no data is loaded yet.
pub fn decode_slug(slug: &str, kind: SlugKind) -> Result<DecodedSlug, SlugError> {
    let trimmed = slug.trim();
    if trimmed.is_empty() {
        return Err(SlugError::Empty);
    }

    let Some((name, id)) = trimmed.rsplit_once('-') else {
        // A bare id with no name part is still a valid slug.
        return validate_id(trimmed, kind).map(|()| DecodedSlug {
            name: String::new(),
            id: trimmed.to_string(),
        });
    };

    validate_id(id, kind)?;
    Ok(DecodedSlug {
        name: name.to_string(),
        id: id.to_string(),
    })
}

fn validate_id(id: &str, kind: SlugKind) -> Result<(), SlugError> {
    if id.is_empty() {
        return Err(SlugError::MissingSeparator { slug: id.to_string() });
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(SlugError::BadCharset { id: id.to_string() });
    }
    if id.len() < MIN_ID_LEN {
        return Err(SlugError::IdTooShort { id: id.to_string() });
    }
    if !id.starts_with(kind.prefix()) {
        return Err(SlugError::WrongPrefix {
            id: id.to_string(),
            expected: kind.prefix(),
        });
    }
    Ok(())
}

fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

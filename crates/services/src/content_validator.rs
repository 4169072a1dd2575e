//! Structural checks, the plain-text policy and NG-word matching.
//!
//! Free text must already be plain text: a value whose markup-free form
//! differs from what was sent is rejected, never silently cleaned.

use std::borrow::Cow;

use domains::AppError;
use thiserror::Error;

/// Name shown on posts whose author gave none.
pub const DEFAULT_ANONYMOUS_NAME: &str = "名無しさん";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPolicy {
    pub title_min: usize,
    pub title_max: usize,
    pub name_max: usize,
    pub default_name: String,
    /// Banned substrings, matched case-sensitively.
    pub ng_words: Vec<String>,
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self {
            title_min: 3,
            title_max: 100,
            name_max: 50,
            default_name: DEFAULT_ANONYMOUS_NAME.to_owned(),
            ng_words: parse_ng_words("爆発,殺人,ころしてやる"),
        }
    }
}

/// Splits a comma-delimited NG-word list, dropping blanks.
pub fn parse_ng_words(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(str::to_owned)
        .collect()
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} must not include HTML tags")]
    MarkupDetected { field: &'static str },
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// An input shape the validator knows how to check.
pub trait Validate {
    type Clean;

    fn validate(self, policy: &ContentPolicy) -> Result<Self::Clean, ValidationError>;
}

/// Reply to an existing thread.
#[derive(Debug, Clone, Copy)]
pub struct PostInput<'a> {
    pub content: &'a str,
    pub name: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanPost {
    pub content: String,
    /// `None` when the poster left the name blank.
    pub name: Option<String>,
}

/// New thread with its opening post.
#[derive(Debug, Clone, Copy)]
pub struct ThreadInput<'a> {
    pub title: &'a str,
    pub category: Option<&'a str>,
    pub content: &'a str,
    pub name: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanThread {
    pub title: String,
    pub category: Option<String>,
    pub post: CleanPost,
}

/// A nickname offered for a thread.
#[derive(Debug, Clone, Copy)]
pub struct NicknameInput<'a>(pub &'a str);

/// The justification text attached to a report.
#[derive(Debug, Clone, Copy)]
pub struct ReportInput<'a> {
    pub content: Option<&'a str>,
}

impl<'a> Validate for PostInput<'a> {
    type Clean = CleanPost;

    fn validate(self, policy: &ContentPolicy) -> Result<CleanPost, ValidationError> {
        let content = required("content", Some(self.content))?;
        ensure_plain_text("content", content)?;
        let name = match self.name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Some(NicknameInput(name).validate(policy)?),
            None => None,
        };
        Ok(CleanPost {
            content: content.to_owned(),
            name,
        })
    }
}

impl<'a> Validate for ThreadInput<'a> {
    type Clean = CleanThread;

    fn validate(self, policy: &ContentPolicy) -> Result<CleanThread, ValidationError> {
        let title = required("title", Some(self.title))?;
        let len = title.chars().count();
        if len < policy.title_min {
            return Err(ValidationError::TooShort {
                field: "title",
                min: policy.title_min,
            });
        }
        if len > policy.title_max {
            return Err(ValidationError::TooLong {
                field: "title",
                max: policy.title_max,
            });
        }
        ensure_plain_text("title", title)?;

        let category = match self.category.map(str::trim).filter(|c| !c.is_empty()) {
            Some(category) => {
                ensure_plain_text("category", category)?;
                Some(category.to_owned())
            }
            None => None,
        };

        let post = PostInput {
            content: self.content,
            name: self.name,
        }
        .validate(policy)?;

        Ok(CleanThread {
            title: title.to_owned(),
            category,
            post,
        })
    }
}

impl<'a> Validate for NicknameInput<'a> {
    type Clean = String;

    fn validate(self, policy: &ContentPolicy) -> Result<String, ValidationError> {
        let name = required("name", Some(self.0))?;
        if name.chars().count() > policy.name_max {
            return Err(ValidationError::TooLong {
                field: "name",
                max: policy.name_max,
            });
        }
        ensure_plain_text("name", name)?;
        Ok(name.to_owned())
    }
}

impl<'a> Validate for ReportInput<'a> {
    type Clean = &'a str;

    fn validate(self, _policy: &ContentPolicy) -> Result<&'a str, ValidationError> {
        required("content", self.content)
    }
}

fn required<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::Required { field }),
    }
}

fn ensure_plain_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if plain_text(value) != value {
        return Err(ValidationError::MarkupDetected { field });
    }
    Ok(())
}

/// The markup-free form of `value`: `<tag ...>`, `</tag>`, `<!...>` and
/// `<?...>` sequences removed. A `<` that does not open a tag (`a < b`, `<3`)
/// is kept as text, and so are entity references such as `&amp;`.
pub fn plain_text(value: &str) -> Cow<'_, str> {
    let Some(first) = find_tag(value, 0) else {
        return Cow::Borrowed(value);
    };
    let mut out = String::with_capacity(value.len());
    let mut cursor = 0;
    let mut next = Some(first);
    while let Some((start, end)) = next {
        out.push_str(&value[cursor..start]);
        cursor = end;
        next = find_tag(value, cursor);
    }
    out.push_str(&value[cursor..]);
    Cow::Owned(out)
}

/// Byte range of the next tag at or after `from`.
fn find_tag(value: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = value.as_bytes();
    let mut i = from;
    while let Some(offset) = value[i..].find('<') {
        let start = i + offset;
        let opens_tag = match bytes.get(start + 1) {
            Some(b'/') => bytes.get(start + 2).is_some_and(u8::is_ascii_alphabetic),
            Some(b'!') | Some(b'?') => true,
            Some(c) => c.is_ascii_alphabetic(),
            None => false,
        };
        if opens_tag {
            if let Some(close) = value[start..].find('>') {
                return Some((start, start + close + 1));
            }
            return None;
        }
        i = start + 1;
    }
    None
}

/// Single entry point for every free-text check, plus NG-word matching.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    policy: ContentPolicy,
}

impl ContentValidator {
    pub fn new(policy: ContentPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ContentPolicy {
        &self.policy
    }

    pub fn validate<I: Validate>(&self, input: I) -> Result<I::Clean, ValidationError> {
        input.validate(&self.policy)
    }

    /// First configured NG word contained in `content`, if any.
    pub fn find_ng_word(&self, content: &str) -> Option<&str> {
        self.policy
            .ng_words
            .iter()
            .find(|word| content.contains(word.as_str()))
            .map(String::as_str)
    }

    pub fn contains_ng_word(&self, content: &str) -> bool {
        self.find_ng_word(content).is_some()
    }

    pub fn default_name(&self) -> &str {
        &self.policy.default_name
    }
}

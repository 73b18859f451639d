use std::fmt;

use crate::store::SyncError;

/// Prefix of every resolver cache key.
pub const CACHE_PREFIX: &str = "learn_cache_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Classes,
    Subjects,
    Chapters,
    Subchapters,
    Subchapter,
    Quiz,
    ChapterContent,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Classes => "classes",
            ContentKind::Subjects => "subjects",
            ContentKind::Chapters => "chapters",
            ContentKind::Subchapters => "subchapters",
            ContentKind::Subchapter => "subchapter",
            ContentKind::Quiz => "quiz",
            ContentKind::ChapterContent => "chapter_content",
        }
    }

    pub fn parse(value: &str) -> Result<Self, SyncError> {
        match value {
            "classes" => Ok(ContentKind::Classes),
            "subjects" => Ok(ContentKind::Subjects),
            "chapters" => Ok(ContentKind::Chapters),
            "subchapters" => Ok(ContentKind::Subchapters),
            "subchapter" | "lesson" => Ok(ContentKind::Subchapter),
            "quiz" => Ok(ContentKind::Quiz),
            "chapter_content" | "content" => Ok(ContentKind::ChapterContent),
            _ => Err(SyncError::State("unknown content kind")),
        }
    }
}

/// One content read, with the scope identifier it is parameterized by.
///
/// Scope identifiers may be dataset slugs or remote object ids; the query
/// carries them verbatim and leaves interpretation to the tier that serves it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentQuery {
    Classes,
    Subjects { class_id: String },
    Chapters { subject_id: String },
    Subchapters { chapter_id: String },
    Subchapter { subchapter_id: String },
    Quiz { subchapter_id: String },
    ChapterContent { chapter_id: String },
}

impl ContentQuery {
    /// Build a query from a kind and an optional scope id.
    pub fn new(kind: ContentKind, id: Option<String>) -> Result<Self, SyncError> {
        if kind == ContentKind::Classes {
            return Ok(ContentQuery::Classes);
        }
        let id = id
            .filter(|s| !s.trim().is_empty())
            .ok_or(SyncError::State("content query requires a scope id"))?;
        Ok(match kind {
            ContentKind::Classes => ContentQuery::Classes,
            ContentKind::Subjects => ContentQuery::Subjects { class_id: id },
            ContentKind::Chapters => ContentQuery::Chapters { subject_id: id },
            ContentKind::Subchapters => ContentQuery::Subchapters { chapter_id: id },
            ContentKind::Subchapter => ContentQuery::Subchapter { subchapter_id: id },
            ContentKind::Quiz => ContentQuery::Quiz { subchapter_id: id },
            ContentKind::ChapterContent => ContentQuery::ChapterContent { chapter_id: id },
        })
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            ContentQuery::Classes => ContentKind::Classes,
            ContentQuery::Subjects { .. } => ContentKind::Subjects,
            ContentQuery::Chapters { .. } => ContentKind::Chapters,
            ContentQuery::Subchapters { .. } => ContentKind::Subchapters,
            ContentQuery::Subchapter { .. } => ContentKind::Subchapter,
            ContentQuery::Quiz { .. } => ContentKind::Quiz,
            ContentQuery::ChapterContent { .. } => ContentKind::ChapterContent,
        }
    }

    pub fn scope_id(&self) -> Option<&str> {
        match self {
            ContentQuery::Classes => None,
            ContentQuery::Subjects { class_id } => Some(class_id.as_str()),
            ContentQuery::Chapters { subject_id } => Some(subject_id.as_str()),
            ContentQuery::Subchapters { chapter_id } | ContentQuery::ChapterContent { chapter_id } => {
                Some(chapter_id.as_str())
            }
            ContentQuery::Subchapter { subchapter_id } | ContentQuery::Quiz { subchapter_id } => {
                Some(subchapter_id.as_str())
            }
        }
    }

    /// URL path segments of the remote read endpoint, e.g.
    /// `["learn", "classes", "{id}", "subjects"]`.
    pub fn path_segments(&self) -> Vec<&str> {
        match self {
            ContentQuery::Classes => vec!["learn", "classes"],
            ContentQuery::Subjects { class_id } => vec!["learn", "classes", class_id.as_str(), "subjects"],
            ContentQuery::Chapters { subject_id } => {
                vec!["learn", "subjects", subject_id.as_str(), "chapters"]
            }
            ContentQuery::Subchapters { chapter_id } => {
                vec!["learn", "chapters", chapter_id.as_str(), "subchapters"]
            }
            ContentQuery::Subchapter { subchapter_id } => vec!["learn", "subchapters", subchapter_id.as_str()],
            ContentQuery::Quiz { subchapter_id } => {
                vec!["learn", "subchapters", subchapter_id.as_str(), "quiz"]
            }
            ContentQuery::ChapterContent { chapter_id } => {
                vec!["learn", "chapters", chapter_id.as_str(), "content"]
            }
        }
    }

    /// Deterministic cache key: `learn_cache_{kind}` or `learn_cache_{kind}_{id}`.
    pub fn cache_key(&self) -> String {
        match self.scope_id() {
            Some(id) => format!("{}{}_{}", CACHE_PREFIX, self.kind().as_str(), id),
            None => format!("{}{}", CACHE_PREFIX, self.kind().as_str()),
        }
    }
}

impl fmt::Display for ContentQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.path_segments().join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_are_distinct_per_kind_and_scope() {
        let a = ContentQuery::Subchapter {
            subchapter_id: "x".into(),
        };
        let b = ContentQuery::Quiz {
            subchapter_id: "x".into(),
        };
        let c = ContentQuery::Quiz {
            subchapter_id: "y".into(),
        };
        assert_eq!(a.cache_key(), "learn_cache_subchapter_x");
        assert_eq!(b.cache_key(), "learn_cache_quiz_x");
        assert_ne!(b.cache_key(), c.cache_key());
        assert_eq!(ContentQuery::Classes.cache_key(), "learn_cache_classes");
    }

    #[test]
    fn display_matches_remote_paths() {
        let q = ContentQuery::Chapters {
            subject_id: "64b7f0c2a1d3e4f5a6b7c8d9".into(),
        };
        assert_eq!(
            q.to_string(),
            "/learn/subjects/64b7f0c2a1d3e4f5a6b7c8d9/chapters"
        );
        let q = ContentQuery::ChapterContent {
            chapter_id: "c1".into(),
        };
        assert_eq!(q.to_string(), "/learn/chapters/c1/content");
    }

    #[test]
    fn new_requires_scope_for_scoped_kinds() {
        assert_eq!(
            ContentQuery::new(ContentKind::Classes, None).unwrap(),
            ContentQuery::Classes
        );
        assert!(ContentQuery::new(ContentKind::Quiz, None).is_err());
        assert!(ContentQuery::new(ContentKind::Quiz, Some("  ".into())).is_err());
        let q = ContentQuery::new(ContentKind::parse("lesson").unwrap(), Some("s1".into())).unwrap();
        assert_eq!(
            q,
            ContentQuery::Subchapter {
                subchapter_id: "s1".into()
            }
        );
    }
}

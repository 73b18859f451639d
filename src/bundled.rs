use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::content::{ContentKind, ContentQuery};
use crate::store::SyncError;

const BUILTIN_DATASET: &str = include_str!("../data/bundled_content.json");

/// Which level of the content tree an identifier names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Class,
    Subject,
    Chapter,
    Subchapter,
}

impl IdKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IdKind::Class => "class",
            IdKind::Subject => "subject",
            IdKind::Chapter => "chapter",
            IdKind::Subchapter => "subchapter",
        }
    }

    /// Kind of the scope identifier a query is parameterized by.
    pub fn of(query: &ContentQuery) -> Option<Self> {
        match query {
            ContentQuery::Classes => None,
            ContentQuery::Subjects { .. } => Some(IdKind::Class),
            ContentQuery::Chapters { .. } => Some(IdKind::Subject),
            ContentQuery::Subchapters { .. } | ContentQuery::ChapterContent { .. } => {
                Some(IdKind::Chapter)
            }
            ContentQuery::Subchapter { .. } | ContentQuery::Quiz { .. } => {
                Some(IdKind::Subchapter)
            }
        }
    }
}

/// Remote-service object ids are 24 lowercase/uppercase hex digits.
/// Anything else is treated as a dataset slug.
pub fn is_remote_id(id: &str) -> bool {
    id.len() == 24 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Explicit table from remote identifiers to dataset slugs.
///
/// Content added to the dataset is only reachable from remote-originated
/// identifiers once it has an entry here (or is covered by a per-kind default).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdMapping {
    #[serde(default)]
    entries: HashMap<String, String>,
    /// Fallback slug per id kind ("class", "subject", ...) for unmapped remote ids.
    #[serde(default)]
    defaults: HashMap<String, String>,
}

impl IdMapping {
    pub fn insert(&mut self, remote_id: impl Into<String>, slug: impl Into<String>) {
        self.entries.insert(remote_id.into(), slug.into());
    }

    pub fn with_entry(mut self, remote_id: impl Into<String>, slug: impl Into<String>) -> Self {
        self.insert(remote_id, slug);
        self
    }

    pub fn with_default(mut self, kind: IdKind, slug: impl Into<String>) -> Self {
        self.defaults.insert(kind.as_str().to_string(), slug.into());
        self
    }

    /// Translate one identifier into a dataset slug.
    ///
    /// Order: explicit entry, then slug pass-through, then the default for
    /// `kind`. An unmapped remote id with no default is a miss.
    pub fn slug_for(&self, kind: IdKind, id: &str) -> Option<String> {
        if let Some(slug) = self.entries.get(id) {
            return Some(slug.clone());
        }
        if !is_remote_id(id) {
            return Some(id.to_string());
        }
        self.defaults.get(kind.as_str()).cloned()
    }
}

/// Address of one entry in the bundled dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetKey {
    pub kind: ContentKind,
    pub slug: Option<String>,
}

/// Map a query's scope identifiers to a dataset key.
pub fn dataset_key(query: &ContentQuery, mapping: &IdMapping) -> Option<DatasetKey> {
    let slug = match (IdKind::of(query), query.scope_id()) {
        (Some(kind), Some(id)) => Some(mapping.slug_for(kind, id)?),
        _ => None,
    };
    Some(DatasetKey {
        kind: query.kind(),
        slug,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundledSubchapter {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub quiz: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundledChapter {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub subchapters: Vec<BundledSubchapter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundledSubject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub chapters: Vec<BundledChapter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundledClass {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subjects: Vec<BundledSubject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetFile {
    classes: Vec<BundledClass>,
    #[serde(default)]
    id_map: IdMapping,
}

/// Read-only content shipped with the binary.
#[derive(Debug, Clone)]
pub struct BundledDataset {
    classes: Vec<BundledClass>,
    mapping: IdMapping,
}

impl BundledDataset {
    /// The dataset compiled into this crate.
    pub fn builtin() -> Result<Self, SyncError> {
        Self::from_json(BUILTIN_DATASET)
    }

    pub fn from_json(raw: &str) -> Result<Self, SyncError> {
        let file: DatasetFile = serde_json::from_str(raw)?;
        Ok(Self {
            classes: file.classes,
            mapping: file.id_map,
        })
    }

    pub fn empty() -> Self {
        Self {
            classes: Vec::new(),
            mapping: IdMapping::default(),
        }
    }

    pub fn with_mapping(mut self, mapping: IdMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn mapping(&self) -> &IdMapping {
        &self.mapping
    }

    /// Look a query up through the identifier mapping.
    pub fn lookup(&self, query: &ContentQuery) -> Option<Value> {
        let key = dataset_key(query, &self.mapping)?;
        self.get(&key)
    }

    /// Render the payload stored under `key`, if any.
    pub fn get(&self, key: &DatasetKey) -> Option<Value> {
        let slug = key.slug.as_deref();
        match (key.kind, slug) {
            (ContentKind::Classes, _) => Some(Value::Array(
                self.classes
                    .iter()
                    .map(|c| json!({ "id": c.id, "name": c.name }))
                    .collect(),
            )),
            (ContentKind::Subjects, Some(class_id)) => {
                let class = self.classes.iter().find(|c| c.id == class_id)?;
                Some(Value::Array(
                    class
                        .subjects
                        .iter()
                        .map(|s| json!({ "id": s.id, "name": s.name, "classId": class.id }))
                        .collect(),
                ))
            }
            (ContentKind::Chapters, Some(subject_id)) => {
                let subject = self.subject(subject_id)?;
                Some(Value::Array(
                    subject
                        .chapters
                        .iter()
                        .map(|ch| json!({ "id": ch.id, "title": ch.title, "subjectId": subject.id }))
                        .collect(),
                ))
            }
            (ContentKind::Subchapters, Some(chapter_id)) => {
                let chapter = self.chapter(chapter_id)?;
                Some(Value::Array(
                    chapter
                        .subchapters
                        .iter()
                        .map(|s| json!({ "id": s.id, "title": s.title, "chapterId": chapter.id }))
                        .collect(),
                ))
            }
            (ContentKind::Subchapter, Some(subchapter_id)) => {
                let sub = self.subchapter(subchapter_id)?;
                Some(json!({ "id": sub.id, "title": sub.title, "content": sub.content }))
            }
            (ContentKind::Quiz, Some(subchapter_id)) => {
                let sub = self.subchapter(subchapter_id)?;
                if sub.quiz.is_empty() {
                    return None;
                }
                Some(json!({ "subchapterId": sub.id, "questions": sub.quiz }))
            }
            (ContentKind::ChapterContent, Some(chapter_id)) => {
                let chapter = self.chapter(chapter_id)?;
                let content = chapter.content.as_ref()?;
                Some(json!({ "id": chapter.id, "title": chapter.title, "content": content }))
            }
            (_, None) => None,
        }
    }

    fn subject(&self, id: &str) -> Option<&BundledSubject> {
        self.classes
            .iter()
            .flat_map(|c| c.subjects.iter())
            .find(|s| s.id == id)
    }

    fn chapter(&self, id: &str) -> Option<&BundledChapter> {
        self.classes
            .iter()
            .flat_map(|c| c.subjects.iter())
            .flat_map(|s| s.chapters.iter())
            .find(|ch| ch.id == id)
    }

    fn subchapter(&self, id: &str) -> Option<&BundledSubchapter> {
        self.classes
            .iter()
            .flat_map(|c| c.subjects.iter())
            .flat_map(|s| s.chapters.iter())
            .flat_map(|ch| ch.subchapters.iter())
            .find(|sub| sub.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATH_REMOTE_ID: &str = "64b7f0c2a1d3e4f5a6b7c8d9";

    #[test]
    fn remote_ids_are_24_hex_digits() {
        assert!(is_remote_id(MATH_REMOTE_ID));
        assert!(!is_remote_id("class-6/mathematics"));
        assert!(!is_remote_id("64b7f0c2a1d3e4f5a6b7c8dz"));
        assert!(!is_remote_id("abc"));
    }

    #[test]
    fn mapping_prefers_explicit_entry() {
        let mapping = IdMapping::default().with_entry(MATH_REMOTE_ID, "class-6/mathematics");
        assert_eq!(
            mapping.slug_for(IdKind::Subject, MATH_REMOTE_ID).as_deref(),
            Some("class-6/mathematics")
        );
    }

    #[test]
    fn mapping_passes_slugs_through() {
        let mapping = IdMapping::default();
        assert_eq!(
            mapping.slug_for(IdKind::Subject, "class-7/science").as_deref(),
            Some("class-7/science")
        );
    }

    #[test]
    fn unmapped_remote_id_uses_default_or_misses() {
        let bare = IdMapping::default();
        assert_eq!(bare.slug_for(IdKind::Class, MATH_REMOTE_ID), None);

        let with_default = IdMapping::default().with_default(IdKind::Class, "class-6");
        assert_eq!(
            with_default.slug_for(IdKind::Class, MATH_REMOTE_ID).as_deref(),
            Some("class-6")
        );
        // defaults are per kind
        assert_eq!(with_default.slug_for(IdKind::Subject, MATH_REMOTE_ID), None);
    }

    #[test]
    fn dataset_key_for_unscoped_query_has_no_slug() {
        let key = dataset_key(&ContentQuery::Classes, &IdMapping::default()).unwrap();
        assert_eq!(key.kind, ContentKind::Classes);
        assert!(key.slug.is_none());
    }

    #[test]
    fn builtin_dataset_parses_and_serves_lists() {
        let dataset = BundledDataset::builtin().unwrap();

        let classes = dataset.lookup(&ContentQuery::Classes).unwrap();
        assert!(!classes.as_array().unwrap().is_empty());

        let chapters = dataset
            .lookup(&ContentQuery::Chapters {
                subject_id: "class-6/mathematics".into(),
            })
            .unwrap();
        assert!(chapters.as_array().unwrap().len() >= 2);
    }

    #[test]
    fn builtin_mapping_reaches_content_from_remote_ids() {
        let dataset = BundledDataset::builtin().unwrap();
        let by_remote = dataset.lookup(&ContentQuery::Chapters {
            subject_id: MATH_REMOTE_ID.into(),
        });
        let by_slug = dataset.lookup(&ContentQuery::Chapters {
            subject_id: "class-6/mathematics".into(),
        });
        assert!(by_remote.is_some());
        assert_eq!(by_remote, by_slug);
    }

    #[test]
    fn builtin_unmapped_remote_ids_fall_back_per_kind() {
        let dataset = BundledDataset::builtin().unwrap();
        let unknown = "ffffffffffffffffffffffff";

        for kind in [
            IdKind::Class,
            IdKind::Subject,
            IdKind::Chapter,
            IdKind::Subchapter,
        ] {
            assert!(
                dataset.mapping().slug_for(kind, unknown).is_some(),
                "no default for {}",
                kind.as_str()
            );
        }

        let queries = [
            ContentQuery::Subjects {
                class_id: unknown.into(),
            },
            ContentQuery::Chapters {
                subject_id: unknown.into(),
            },
            ContentQuery::Subchapters {
                chapter_id: unknown.into(),
            },
            ContentQuery::ChapterContent {
                chapter_id: unknown.into(),
            },
            ContentQuery::Subchapter {
                subchapter_id: unknown.into(),
            },
            ContentQuery::Quiz {
                subchapter_id: unknown.into(),
            },
        ];
        for query in &queries {
            assert!(dataset.lookup(query).is_some(), "bundled miss for {query}");
        }
    }

    #[test]
    fn unknown_slug_is_a_miss() {
        let dataset = BundledDataset::builtin().unwrap();
        assert!(
            dataset
                .lookup(&ContentQuery::Subchapter {
                    subchapter_id: "class-12/astrophysics/black-holes/intro".into(),
                })
                .is_none()
        );
    }
}

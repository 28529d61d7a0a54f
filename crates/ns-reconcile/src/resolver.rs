//! Placeholder markers (`[[synth:page:<id>]]`, `[[synth:user:<id>]]`) inside
//! free text, resolved against the state store.

use std::sync::OnceLock;

use ns_state::{StateResult, StateStore};
use regex::Regex;

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        match Regex::new(r"\[\[synth:(?P<kind>page|user):(?P<id>[a-zA-Z0-9_\-:]+)\]\]") {
            Ok(re) => re,
            Err(_) => unreachable!("static regex pattern is valid"),
        }
    })
}

/// One piece of resolved text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    PageMention { remote_id: String },
    UserMention { user_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
    #[default]
    Normal,
    /// Best-effort closure for the link pass: never reports unresolved markers.
    Force,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    pub segments: Vec<Segment>,
    /// Some marker could not be mapped yet and was kept as literal text.
    pub unresolved: bool,
}

/// Resolves markers using page records and the identity map.
#[derive(Clone, Copy)]
pub struct PlaceholderResolver<'a> {
    store: &'a StateStore,
}

impl<'a> PlaceholderResolver<'a> {
    pub fn new(store: &'a StateStore) -> Self {
        Self { store }
    }

    pub fn resolve(&self, text: &str, mode: ResolveMode) -> StateResult<Resolution> {
        let mut resolution = Resolution::default();
        let mut cursor = 0usize;

        for caps in marker_regex().captures_iter(text) {
            let (Some(whole), Some(kind), Some(id)) = (caps.get(0), caps.name("kind"), caps.name("id"))
            else {
                continue;
            };
            if whole.start() > cursor {
                resolution
                    .segments
                    .push(Segment::Text(text[cursor..whole.start()].to_string()));
            }
            let resolved = match kind.as_str() {
                "page" => self
                    .store
                    .remote_id_of(id.as_str())?
                    .map(|remote_id| Segment::PageMention { remote_id }),
                _ => self
                    .store
                    .workspace_user_of(id.as_str())?
                    .map(|user_id| Segment::UserMention { user_id }),
            };
            match resolved {
                Some(segment) => resolution.segments.push(segment),
                None => {
                    resolution
                        .segments
                        .push(Segment::Text(whole.as_str().to_string()));
                    resolution.unresolved = true;
                }
            }
            cursor = whole.end();
        }
        if cursor < text.len() {
            resolution
                .segments
                .push(Segment::Text(text[cursor..].to_string()));
        }

        if mode == ResolveMode::Force {
            resolution.unresolved = false;
        }
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ns_blueprint::EntityKind;
    use ns_state::{IdentityUpdate, ObjectUpsert};

    fn store() -> StateStore {
        let store = StateStore::open_in_memory().expect("store");
        store
            .upsert_object(&ObjectUpsert {
                synth_id: "page_a",
                kind: EntityKind::Page,
                provider: "mock",
                remote_id: "remote-a",
                parent_synth_id: None,
                spec_hash: "h",
            })
            .expect("object");
        store
            .upsert_identity(
                "user_1",
                &IdentityUpdate {
                    notion_user_id: Some("notionuser_42".into()),
                    ..IdentityUpdate::default()
                },
            )
            .expect("identity");
        store
    }

    #[test]
    fn resolves_page_and_user_markers() {
        let store = store();
        let resolution = PlaceholderResolver::new(&store)
            .resolve("See [[synth:page:page_a]] with [[synth:user:user_1]].", ResolveMode::Normal)
            .expect("resolve");
        assert!(!resolution.unresolved);
        assert_eq!(
            resolution.segments,
            vec![
                Segment::Text("See ".into()),
                Segment::PageMention { remote_id: "remote-a".into() },
                Segment::Text(" with ".into()),
                Segment::UserMention { user_id: "notionuser_42".into() },
                Segment::Text(".".into()),
            ]
        );
    }

    #[test]
    fn unresolved_marker_is_kept_literally() {
        let store = store();
        let resolver = PlaceholderResolver::new(&store);
        let resolution = resolver
            .resolve("ask [[synth:user:user_9]]", ResolveMode::Normal)
            .expect("resolve");
        assert!(resolution.unresolved);
        assert_eq!(
            resolution.segments,
            vec![
                Segment::Text("ask ".into()),
                Segment::Text("[[synth:user:user_9]]".into()),
            ]
        );

        let forced = resolver
            .resolve("ask [[synth:user:user_9]]", ResolveMode::Force)
            .expect("resolve");
        assert!(!forced.unresolved);
        assert_eq!(forced.segments, resolution.segments);
    }

    #[test]
    fn identity_without_workspace_user_is_unresolved() {
        let store = store();
        store
            .upsert_identity(
                "user_2",
                &IdentityUpdate {
                    entra_object_id: Some("entra-2".into()),
                    ..IdentityUpdate::default()
                },
            )
            .expect("identity");
        let resolution = PlaceholderResolver::new(&store)
            .resolve("[[synth:user:user_2]]", ResolveMode::Normal)
            .expect("resolve");
        assert!(resolution.unresolved);
    }

    #[test]
    fn plain_and_empty_text() {
        let store = store();
        let resolver = PlaceholderResolver::new(&store);
        assert_eq!(resolver.resolve("", ResolveMode::Normal).expect("empty"), Resolution::default());
        let plain = resolver
            .resolve("[[synth:team:x]] is not a marker", ResolveMode::Normal)
            .expect("plain");
        assert_eq!(
            plain.segments,
            vec![Segment::Text("[[synth:team:x]] is not a marker".into())]
        );
        assert!(!plain.unresolved);
    }
}

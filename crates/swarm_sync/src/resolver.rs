use tracing::{debug, warn};

use crate::dto::image::ImageReference;
use crate::registry::{RegistryError, TagRegistry};
use crate::tag::{compile_matcher, compile_ranker, TagPattern};

/// Pick the tag that should be running out of `tags`.
///
/// Returns `None` if no tag matches the pattern.
pub fn select_latest<I, S>(tags: I, pattern: &TagPattern) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let matcher = compile_matcher(pattern);
    let ranker = compile_ranker(pattern);

    let mut candidates: Vec<String> = tags.into_iter()
        .map(Into::<String>::into)
        .filter(|t| matcher(t.as_str()))
        .collect();
    candidates.sort_by(|a, b| ranker(a.as_str(), b.as_str()));

    candidates.pop()
}

/// Resolve the newest tag of the image's repository that satisfies `pattern`.
///
/// The tag list is fetched fresh on every call. Finding no matching tag is not an error, it
/// is logged and `None` is returned.
pub async fn resolve_latest(registry: &dyn TagRegistry, image: &ImageReference, pattern: &TagPattern) -> Result<Option<String>, RegistryError> {
    let tags = registry.list_tags(image).await?;

    match select_latest(tags, pattern) {
        Some(tag) => {
            debug!("Latest tag of {} for pattern '{}' is '{}'", image.canonical_name(), pattern, tag);
            Ok(Some(tag))
        },
        None => {
            warn!("No matching tag found for {} with tag pattern '{}'", image.canonical_name(), pattern);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::FakeRegistry;

    use super::*;

    #[test]
    fn picks_the_biggest_matching_tag() {
        let pattern = TagPattern::parse("glob:5.*");
        assert_eq!(select_latest(["5.1", "5.10", "5.2", "6.0", "15.3"], &pattern), Some("5.10".to_string()));
    }

    #[test]
    fn no_matching_tag_is_none() {
        let pattern = TagPattern::parse("glob:7.*");
        assert_eq!(select_latest(["5.1", "6.0"], &pattern), None);
        assert_eq!(select_latest(Vec::<String>::new(), &pattern), None);
    }

    #[test]
    fn broken_pattern_selects_nothing() {
        let pattern = TagPattern::parse("glob:5.[");
        assert_eq!(select_latest(["5.1", "5.["], &pattern), None);
    }

    #[test]
    fn selection_is_idempotent_and_order_independent() {
        let pattern = TagPattern::parse("1.*");
        let tags = vec!["1.2", "1.2.0", "1.10", "1.9", "1.10.0"];
        let mut reversed = tags.clone();
        reversed.reverse();

        let first = select_latest(tags.clone(), &pattern);
        assert_eq!(first, select_latest(tags, &pattern));
        assert_eq!(first, select_latest(reversed, &pattern));
        assert_eq!(first, Some("1.10.0".to_string()));
    }

    #[tokio::test]
    async fn resolves_from_the_registry() {
        let registry = FakeRegistry::new()
            .with_tags("docker.io/library/redis", &["7.0", "7.2", "latest", "6.2"]);
        let image = ImageReference::parse("redis:7.0").unwrap();

        let tag = resolve_latest(&registry, &image, &TagPattern::parse("7.*")).await.unwrap();
        assert_eq!(tag.as_deref(), Some("7.2"));

        let tag = resolve_latest(&registry, &image, &TagPattern::parse("latest")).await.unwrap();
        assert_eq!(tag.as_deref(), Some("latest"));

        let tag = resolve_latest(&registry, &image, &TagPattern::parse("8.*")).await.unwrap();
        assert_eq!(tag, None);
    }

    #[tokio::test]
    async fn registry_errors_propagate() {
        let registry = FakeRegistry::new();
        let image = ImageReference::parse("redis:7.0").unwrap();

        assert!(resolve_latest(&registry, &image, &TagPattern::parse("7.*")).await.is_err());
    }
}

use std::cmp::Ordering;

/// One dot separated component of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    /// Digits with leading zeros stripped, so `007` and `7` are the same number.
    Numeric(&'a str),
    Text(&'a str),
}

impl<'a> Segment<'a> {
    const ZERO: Segment<'static> = Segment::Numeric("");

    fn parse(s: &'a str) -> Self {
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            Segment::Numeric(s.trim_start_matches('0'))
        } else {
            Segment::Text(s)
        }
    }
}

impl Ord for Segment<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            // Without leading zeros a longer number is always the bigger one.
            (Segment::Numeric(a), Segment::Numeric(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Segment::Numeric(_), Segment::Text(_)) => Ordering::Less,
            (Segment::Text(_), Segment::Numeric(_)) => Ordering::Greater,
            (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Segment<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The rank of a tag when read as a version, e.g. `v1.10.0-rc.1+build5`.
#[derive(Debug)]
struct VersionKey<'a> {
    release: Vec<Segment<'a>>,
    prerelease: Option<Vec<Segment<'a>>>,
}

impl<'a> VersionKey<'a> {
    fn parse(tag: &'a str) -> Self {
        let mut rest = tag;

        // `v1.2` ranks like `1.2`, `vanilla` stays as it is.
        if let Some(stripped) = rest.strip_prefix(['v', 'V']) {
            if stripped.starts_with(|c: char| c.is_ascii_digit()) {
                rest = stripped;
            }
        }

        // Build metadata does not take part in ranking.
        if let Some((version, _build)) = rest.split_once('+') {
            rest = version;
        }

        let (release, prerelease) = match rest.split_once('-') {
            Some((release, prerelease)) => (release, Some(prerelease)),
            None => (rest, None),
        };

        Self {
            release: release.split('.').map(Segment::parse).collect(),
            prerelease: prerelease.map(|p| p.split('.').map(Segment::parse).collect()),
        }
    }
}

impl Ord for VersionKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Missing release segments count as zero, so `1.2` ranks equal to `1.2.0`.
        let len = self.release.len().max(other.release.len());
        for i in 0..len {
            let a = self.release.get(i).unwrap_or(&Segment::ZERO);
            let b = other.release.get(i).unwrap_or(&Segment::ZERO);
            match a.cmp(b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }

        match (&self.prerelease, &other.prerelease) {
            (None, None) => Ordering::Equal,
            // A prerelease ranks below the release it leads up to.
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialEq for VersionKey<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionKey<'_> {}

impl PartialOrd for VersionKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two tags as versions.
///
/// Dot separated segments are compared numerically when both are digits and lexically
/// otherwise. Tags that rank the same (e.g. `1.2` and `1.2.0`) fall back to plain string
/// order, so the result is a total order and the biggest tag of a list never depends on the
/// order the registry returned it in.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    VersionKey::parse(a)
        .cmp(&VersionKey::parse(b))
        .then_with(|| a.cmp(b))
}

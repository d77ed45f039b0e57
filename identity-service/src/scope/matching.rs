//! Wildcard scope matching.
//!
//! A scope is `<realm>:<context>:<action>` where every part is a
//! dot-separated list of segments. A segment is empty (new/unspecified
//! instance), `*` (any), a literal (`[A-Za-z0-9_-]+`), or a `{placeholder}`
//! to be resolved by [`inject`]. Matching is strictly segment-wise: two
//! scopes relate only when their part and segment arities line up, so the
//! short selector scopes used by the permission evaluator can never collide
//! with full codec-built scopes.

use std::collections::HashMap;

fn split(scope: &str) -> Option<Vec<Vec<&str>>> {
    let parts: Vec<&str> = scope.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    Some(parts.iter().map(|p| p.split('.').collect()).collect())
}

fn segment_is_valid(segment: &str) -> bool {
    if segment.is_empty() || segment == "*" {
        return true;
    }
    if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        return !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    }
    segment
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Whether `scope` is well-formed: three `:`-parts, every segment valid.
pub fn is_valid(scope: &str) -> bool {
    match split(scope) {
        Some(parts) => parts
            .iter()
            .all(|segments| segments.iter().all(|s| segment_is_valid(s))),
        None => false,
    }
}

fn segment_superset(a: &str, b: &str) -> bool {
    a == "*" || a == b
}

/// Whether `a` grants everything `b` grants. `*` dominates any segment value
/// (including the empty one); arity mismatch is never a superset.
pub fn is_superset(a: &str, b: &str) -> bool {
    let (pa, pb) = match (split(a), split(b)) {
        (Some(pa), Some(pb)) => (pa, pb),
        _ => return false,
    };
    pa.len() == pb.len()
        && pa.iter().zip(pb.iter()).all(|(sa, sb)| {
            sa.len() == sb.len()
                && sa
                    .iter()
                    .zip(sb.iter())
                    .all(|(a, b)| segment_superset(a, b))
        })
}

/// Whether any element of `set` is a superset of `scope`.
pub fn set_contains(set: &[String], scope: &str) -> bool {
    set.iter().any(|s| is_superset(s, scope))
}

/// Whether `a` collectively grants every scope in `b`.
pub fn set_is_superset(a: &[String], b: &[String]) -> bool {
    b.iter().all(|s| set_contains(a, s))
}

/// Whether `a` grants everything in `b` and `b` does not grant everything in
/// `a`.
pub fn set_is_strict_superset(a: &[String], b: &[String]) -> bool {
    set_is_superset(a, b) && !set_is_superset(b, a)
}

fn segment_intersect<'a>(a: &'a str, b: &'a str) -> Option<&'a str> {
    if a == b {
        Some(a)
    } else if a == "*" {
        Some(b)
    } else if b == "*" {
        Some(a)
    } else {
        None
    }
}

/// The greatest scope granted by both `a` and `b`, if any.
pub fn intersect(a: &str, b: &str) -> Option<String> {
    let (pa, pb) = match (split(a), split(b)) {
        (Some(pa), Some(pb)) => (pa, pb),
        _ => return None,
    };
    if pa.len() != pb.len() {
        return None;
    }
    let mut parts = Vec::with_capacity(pa.len());
    for (sa, sb) in pa.iter().zip(pb.iter()) {
        if sa.len() != sb.len() {
            return None;
        }
        let mut segments = Vec::with_capacity(sa.len());
        for (a, b) in sa.iter().zip(sb.iter()) {
            segments.push(segment_intersect(a, b)?);
        }
        parts.push(segments.join("."));
    }
    Some(parts.join(":"))
}

/// Pairwise intersection of two scope sets, simplified.
pub fn intersect_sets(xs: &[String], ys: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for x in xs {
        for y in ys {
            if let Some(s) = intersect(x, y) {
                out.push(s);
            }
        }
    }
    simplify(out)
}

/// Deduplicate and drop scopes dominated by another element; output is
/// sorted so persisted scope sets are deterministic.
pub fn simplify(mut scopes: Vec<String>) -> Vec<String> {
    scopes.sort();
    scopes.dedup();
    let kept: Vec<String> = scopes
        .iter()
        .filter(|s| {
            !scopes
                .iter()
                .any(|t| t.as_str() != s.as_str() && is_superset(t, s))
        })
        .cloned()
        .collect();
    kept
}

/// Substitute `{placeholder}` segments from `values`. A placeholder that is
/// unknown or resolves to `None` drops the whole scope.
pub fn inject(scope: &str, values: &HashMap<String, Option<String>>) -> Option<String> {
    let parts = split(scope)?;
    let mut out_parts = Vec::with_capacity(parts.len());
    for segments in &parts {
        let mut out_segments = Vec::with_capacity(segments.len());
        for segment in segments {
            match segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
            {
                Some(name) => match values.get(name) {
                    Some(Some(value)) => out_segments.push(value.clone()),
                    _ => return None,
                },
                None => out_segments.push((*segment).to_string()),
            }
        }
        out_parts.push(out_segments.join("."));
    }
    Some(out_parts.join(":"))
}

/// One scope from the set that fits an [`extract`] template, with the values
/// bound by its capture segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractMatch {
    pub scope: String,
    pub captures: HashMap<String, String>,
}

/// Match `set` elements against a template whose `(name)` segments capture
/// the corresponding segment value. A literal (or empty) template segment is
/// satisfied by an equal segment or by `*`.
pub fn extract(template: &str, set: &[String]) -> Vec<ExtractMatch> {
    let tparts = match split(template) {
        Some(p) => p,
        None => return Vec::new(),
    };
    let mut matches = Vec::new();
    'scopes: for scope in set {
        let sparts = match split(scope) {
            Some(p) => p,
            None => continue,
        };
        if sparts.len() != tparts.len() {
            continue;
        }
        let mut captures = HashMap::new();
        for (tsegs, ssegs) in tparts.iter().zip(sparts.iter()) {
            if tsegs.len() != ssegs.len() {
                continue 'scopes;
            }
            for (t, s) in tsegs.iter().zip(ssegs.iter()) {
                match t.strip_prefix('(').and_then(|x| x.strip_suffix(')')) {
                    Some(name) => {
                        captures.insert(name.to_string(), (*s).to_string());
                    }
                    None => {
                        if !(s == t || *s == "*") {
                            continue 'scopes;
                        }
                    }
                }
            }
        }
        matches.push(ExtractMatch {
            scope: scope.clone(),
            captures,
        });
    }
    matches
}

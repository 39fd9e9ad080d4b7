use std::collections::BTreeMap;

/// Flat mapping from dotted symbol path to value.
///
/// The interchange format between matching, generation and completion.
pub type Spec = BTreeMap<String, String>;

/// Split `spec` into the fields scoped under `scope` (with the prefix
/// stripped) and everything else.
///
/// The bare `scope` key is a presence marker written for composites that
/// record no fields of their own; it is consumed here.
pub fn enter_scope(spec: &Spec, scope: &str) -> (Spec, Spec) {
    let prefix = format!("{}.", scope);
    let mut inner = Spec::new();
    let mut outer = Spec::new();

    for (key, value) in spec {
        if let Some(local) = key.strip_prefix(&prefix) {
            inner.insert(local.to_string(), value.clone());
        } else if key != scope {
            outer.insert(key.clone(), value.clone());
        }
    }
    (inner, outer)
}

/// Inverse of [`enter_scope`]: re-prefix what is left of `inner` and merge
/// it back with `outer`.
pub fn leave_scope(inner: Spec, outer: Spec, scope: &str) -> Spec {
    let mut merged = outer;
    for (key, value) in inner {
        merged.insert(format!("{}.{}", scope, key), value);
    }
    merged
}

/// Whether `spec` holds anything for `scope`, either the key itself or a
/// key nested below it.
pub fn mentions(spec: &Spec, scope: &str) -> bool {
    let prefix = format!("{}.", scope);
    spec.keys().any(|key| key == scope || key.starts_with(&prefix))
}

/// Number of keys present in both specs with equal values.
pub fn overlap(a: &Spec, b: &Spec) -> usize {
    a.iter().filter(|(key, value)| b.get(*key) == Some(*value)).count()
}

/// `primary` extended with the keys of `fallback` it lacks.
pub fn merge_missing(primary: &Spec, fallback: &Spec) -> Spec {
    let mut merged = fallback.clone();
    merged.extend(primary.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

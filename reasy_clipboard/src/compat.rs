/// Whether a clipboard entry of type `source` may be pasted where `target` is expected.
///
/// Accepts exact matches, generics sharing their innermost argument
/// (`List<app.Leaf>` vs `Array<app.Leaf>`), and arrays whose element types match.
pub fn is_compatible(target: &str, source: &str) -> bool {
    if target.is_empty() || source.is_empty() {
        return false;
    }
    if target == source {
        return true;
    }
    if template_base(target) == template_base(source) {
        return true;
    }
    match (target.strip_suffix("[]"), source.strip_suffix("[]")) {
        (Some(t), Some(s)) => is_compatible(t, s),
        _ => false,
    }
}

fn template_base(name: &str) -> &str {
    let inner = match name.rfind('<') {
        Some(at) => &name[at + 1..],
        None => name,
    };
    inner.trim_end_matches('>')
}

/// Label that stores the metric name of a series.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Returns true for names matching `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    matches_grammar(name, |c| c == ':')
}

/// Returns true for names matching `[a-zA-Z_][a-zA-Z0-9_]*` other than `__name__`.
pub fn is_valid_label_name(name: &str) -> bool {
    name != METRIC_NAME_LABEL && matches_label_name_grammar(name)
}

/// Label-name grammar only; annotation keys are checked with this.
pub fn matches_label_name_grammar(name: &str) -> bool {
    matches_grammar(name, |_| false)
}

/// Label values may hold any valid UTF-8 sequence.
pub fn is_valid_label_value(value: impl AsRef<[u8]>) -> bool {
    std::str::from_utf8(value.as_ref()).is_ok()
}

fn matches_grammar(name: &str, extra: impl Fn(char) -> bool) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_' || extra(first)) {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || extra(c))
}

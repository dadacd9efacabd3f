//! The few template expressions the virtual table understands.

/// A parsed `{{ ... }}` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// `{{ states('sensor.x') }}`
    States(String),
    /// `{{ is_state('sensor.x', 'on') }}`
    IsState(String, String),
    /// `{{ true }}` or `{{ false }}`
    Literal(bool),
}

/// Whether `text` contains template markup at all.
#[must_use]
pub fn is_template(text: &str) -> bool {
    text.contains("{{")
}

/// Parse a whole-string template. Returns `None` for anything unsupported.
#[must_use]
pub fn parse(text: &str) -> Option<Expression> {
    let inner = text.trim().strip_prefix("{{")?.strip_suffix("}}")?.trim();
    match inner {
        "true" | "True" => return Some(Expression::Literal(true)),
        "false" | "False" => return Some(Expression::Literal(false)),
        _ => {}
    }

    let (name, rest) = inner.split_once('(')?;
    let args = rest.trim_end().strip_suffix(')')?;
    let args = args
        .split(',')
        .map(|arg| unquote(arg.trim()))
        .collect::<Option<Vec<_>>>()?;

    match (name.trim(), args.as_slice()) {
        ("states", [id]) => Some(Expression::States(id.clone())),
        ("is_state", [id, value]) => Some(Expression::IsState(id.clone(), value.clone())),
        _ => None,
    }
}

fn unquote(arg: &str) -> Option<String> {
    arg.strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| arg.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .map(str::to_string)
}

use tracing::debug;

/// Routing decision for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Resumable assistant; `text` has every trigger phrase removed.
    Stateful { text: String },
    /// Agentic tool; `text` is the message as received.
    Agent { text: String },
}

impl Route {
    pub fn text(&self) -> &str {
        match self {
            Self::Stateful { text } | Self::Agent { text } => text,
        }
    }

    pub fn is_stateful(&self) -> bool {
        matches!(self, Self::Stateful { .. })
    }

    /// Short backend label for logs.
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Stateful { .. } => "claude",
            Self::Agent { .. } => "cursor",
        }
    }
}

/// Whether `text` contains any pattern, ignoring case.
pub fn is_tagged<S: AsRef<str>>(text: &str, patterns: &[S]) -> bool {
    let lowered = text.to_lowercase();
    patterns
        .iter()
        .map(AsRef::as_ref)
        .filter(|p| !p.is_empty())
        .any(|p| lowered.contains(&p.to_lowercase()))
}

/// Remove every occurrence of each pattern, as configured and upper-cased,
/// in pattern order, then trim.
///
/// Mixed-case spellings such as `Hey Claude` are left in place.
pub fn strip_tag<S: AsRef<str>>(text: &str, patterns: &[S]) -> String {
    patterns
        .iter()
        .map(AsRef::as_ref)
        .filter(|p| !p.is_empty())
        .fold(text.to_string(), |acc, p| {
            acc.replace(p, "").replace(&p.to_uppercase(), "")
        })
        .trim()
        .to_string()
}

/// Pick the backend for `text`.
pub fn decide<S: AsRef<str>>(text: &str, patterns: &[S], agent_configured: bool) -> Route {
    let tagged = is_tagged(text, patterns);
    let route = if tagged || !agent_configured {
        Route::Stateful {
            text: strip_tag(text, patterns),
        }
    } else {
        Route::Agent {
            text: text.to_string(),
        }
    };
    debug!(tagged, agent_configured, backend = route.backend(), "routed message");
    route
}

//! Component I: the HTML paywall capability interface (`spec.md` §4.G step 2: "If the
//! `Accept` header preferentially selects `text/html` and a `PaywallProvider` is
//! registered, return a rendered HTML paywall instead of JSON").

use x402_types::PaymentRequired;

pub trait PaywallProvider: Send + Sync {
    fn render(&self, payment_required: &PaymentRequired) -> String;
}

/// Returns `true` when the request's `Accept` header prefers `text/html` over
/// `application/json` — a simple first-listed-preference check, not full RFC 7231
/// quality-value negotiation.
pub fn prefers_html(accept_header: Option<&str>) -> bool {
    let Some(accept) = accept_header else {
        return false;
    };
    for candidate in accept.split(',') {
        let candidate = candidate.trim();
        if candidate.starts_with("text/html") {
            return true;
        }
        if candidate.starts_with("application/json") {
            return false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_preference_wins_when_listed_first() {
        assert!(prefers_html(Some("text/html, application/json")));
    }

    #[test]
    fn json_preference_wins_when_listed_first() {
        assert!(!prefers_html(Some("application/json, text/html")));
    }

    #[test]
    fn absent_header_defaults_to_json() {
        assert!(!prefers_html(None));
    }
}

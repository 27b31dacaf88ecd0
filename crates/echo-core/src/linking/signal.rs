use crate::api::{ApiResult, ReplyOutcome, StatusReply};

/// What a linking reply asks the controller to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSignal {
    CodeRequired(String),
    PasswordRequired(String),
    Linked(String),
    Failed(String),
}

impl LinkSignal {
    /// Interpret an add/finalize reply.
    ///
    /// A tagged `outcome` wins. Without one, the free-text message is matched:
    /// older backends report the 2FA step as an *error* whose message asks for
    /// the password, so failures are inspected too.
    pub fn classify(reply: ApiResult<StatusReply>) -> Self {
        match reply {
            Ok(reply) => Self::from_reply(&reply),
            Err(err) => {
                let message = err.operator_message();
                if asks_for_password(&message) {
                    LinkSignal::PasswordRequired(message)
                } else {
                    LinkSignal::Failed(message)
                }
            }
        }
    }

    fn from_reply(reply: &StatusReply) -> Self {
        let text = reply.text().to_owned();
        match reply.outcome {
            Some(ReplyOutcome::CodeRequired) => LinkSignal::CodeRequired(text),
            Some(ReplyOutcome::PasswordRequired) => LinkSignal::PasswordRequired(text),
            Some(ReplyOutcome::Linked) => LinkSignal::Linked(text),
            Some(ReplyOutcome::Error) => LinkSignal::Failed(text),
            None if asks_for_password(&text) => LinkSignal::PasswordRequired(text),
            None if reply.is_error() => LinkSignal::Failed(text),
            None if announces_code(&text) => LinkSignal::CodeRequired(text),
            None => LinkSignal::Linked(text),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            LinkSignal::CodeRequired(text)
            | LinkSignal::PasswordRequired(text)
            | LinkSignal::Linked(text)
            | LinkSignal::Failed(text) => text,
        }
    }
}

fn announces_code(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("code") && message.contains("sent")
}

fn asks_for_password(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("password")
        && (message.contains("required")
            || message.contains("needed")
            || message.contains("2fa")
            || message.contains("two-factor"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use reqwest::StatusCode;
    use serde_json::json;

    fn reply(value: serde_json::Value) -> ApiResult<StatusReply> {
        Ok(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn code_sent_message() {
        let signal = LinkSignal::classify(reply(
            json!({ "status": "ok", "message": "Verification code sent to +15551234567" }),
        ));
        assert!(matches!(signal, LinkSignal::CodeRequired(_)));
    }

    #[test]
    fn password_required_error() {
        let signal = LinkSignal::classify(Err(ApiError::HttpStatus {
            status: StatusCode::UNAUTHORIZED,
            message: "2FA password required".into(),
        }));
        assert_eq!(
            signal,
            LinkSignal::PasswordRequired("2FA password required".into())
        );

        let signal = LinkSignal::classify(Err(ApiError::Rejected {
            message: "Two-factor password needed".into(),
        }));
        assert!(matches!(signal, LinkSignal::PasswordRequired(_)));
    }

    #[test]
    fn other_success_links() {
        let signal = LinkSignal::classify(reply(
            json!({ "status": "ok", "message": "Account already authorized" }),
        ));
        assert_eq!(signal, LinkSignal::Linked("Account already authorized".into()));
    }

    #[test]
    fn other_errors_fail_verbatim() {
        let signal = LinkSignal::classify(Err(ApiError::Rejected {
            message: "Invalid password".into(),
        }));
        assert_eq!(signal, LinkSignal::Failed("Invalid password".into()));
    }

    #[test]
    fn tagged_outcome_wins_over_text() {
        let signal = LinkSignal::classify(reply(
            json!({ "outcome": "linked", "detail": "code sent earlier, now linked" }),
        ));
        assert!(matches!(signal, LinkSignal::Linked(_)));

        let signal = LinkSignal::classify(reply(
            json!({ "outcome": "password_required", "detail": "enter it" }),
        ));
        assert_eq!(signal.text(), "enter it");
        assert!(matches!(signal, LinkSignal::PasswordRequired(_)));
    }
}

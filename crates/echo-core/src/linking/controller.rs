use std::fmt;
use std::future::Future;

use tracing::{debug, info, warn};

use super::session::SessionSlot;
use super::{LinkError, LinkSignal};
use crate::api::{Account, EchoApiClient, FinalizeRequest};

/// Where a linking session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStage {
    Start,
    CodeRequested,
    PasswordRequested,
    Linked,
    Failed,
}

impl LinkStage {
    /// Next stage for a reply received while in `self`; `Err` carries the failure text.
    fn advance(self, signal: LinkSignal) -> Result<LinkStage, String> {
        match (self, signal) {
            (LinkStage::Start, LinkSignal::CodeRequired(_)) => Ok(LinkStage::CodeRequested),
            (
                LinkStage::Start | LinkStage::CodeRequested,
                LinkSignal::PasswordRequired(_),
            ) => Ok(LinkStage::PasswordRequested),
            (
                LinkStage::Start | LinkStage::CodeRequested | LinkStage::PasswordRequested,
                LinkSignal::Linked(_),
            ) => Ok(LinkStage::Linked),
            (_, LinkSignal::Failed(reason)) => Err(reason),
            // The backend repeating its request means the answer was refused.
            (LinkStage::PasswordRequested, LinkSignal::PasswordRequired(reason))
            | (LinkStage::CodeRequested, LinkSignal::CodeRequired(reason)) => Err(reason),
            (stage, other) => Err(format!(
                "unexpected reply while {stage}: {}",
                other.text()
            )),
        }
    }
}

impl fmt::Display for LinkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            LinkStage::Start => "starting",
            LinkStage::CodeRequested => "awaiting code",
            LinkStage::PasswordRequested => "awaiting password",
            LinkStage::Linked => "linked",
            LinkStage::Failed => "failed",
        };
        write!(f, "{value}")
    }
}

/// Which secret the operator is being asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Code,
    Password,
}

/// How a linking session ended.
///
/// `accounts` is the account list fetched after reaching a terminal stage;
/// it is `None` only when that refresh itself failed.
#[derive(Debug)]
pub enum LinkOutcome {
    Linked {
        accounts: Option<Vec<Account>>,
    },
    Failed {
        stage: LinkStage,
        reason: String,
        accounts: Option<Vec<Account>>,
    },
    Abandoned {
        stage: LinkStage,
    },
}

impl LinkOutcome {
    pub fn stage(&self) -> LinkStage {
        match self {
            LinkOutcome::Linked { .. } => LinkStage::Linked,
            LinkOutcome::Failed { .. } => LinkStage::Failed,
            LinkOutcome::Abandoned { stage } => *stage,
        }
    }
}

/// Walks an operator through adding an account: phone, then a verification
/// code and/or a 2FA password, as many round trips as the backend asks for.
#[derive(Debug, Clone)]
pub struct LinkController {
    client: EchoApiClient,
    slot: SessionSlot,
}

impl LinkController {
    pub fn new(client: EchoApiClient) -> Self {
        Self {
            client,
            slot: SessionSlot::default(),
        }
    }

    /// Phone of the session currently in flight, if any.
    pub fn active_phone(&self) -> Option<String> {
        self.slot.active()
    }

    /// Link `phone`, calling `read_input` whenever the backend wants a code or
    /// password. A `None` or blank answer abandons the session without any
    /// further request.
    pub async fn run<Input, Fut>(
        &self,
        phone: &str,
        mut read_input: Input,
    ) -> Result<LinkOutcome, LinkError>
    where
        Input: FnMut(PromptKind) -> Fut,
        Fut: Future<Output = Result<Option<String>, LinkError>>,
    {
        let phone = phone.trim();
        if phone.is_empty() {
            debug!("no phone supplied; nothing to link");
            return Ok(LinkOutcome::Abandoned {
                stage: LinkStage::Start,
            });
        }

        let _guard = self.slot.acquire(phone)?;
        info!(phone, "requesting account link");

        let mut stage = LinkStage::Start;
        let mut signal = LinkSignal::classify(self.client.add_account(phone).await);

        loop {
            stage = match stage.advance(signal) {
                Ok(next) => next,
                Err(reason) => return Ok(self.fail(phone, stage, reason).await),
            };
            debug!(phone, %stage, "link stage changed");

            let kind = match stage {
                LinkStage::CodeRequested => PromptKind::Code,
                LinkStage::PasswordRequested => PromptKind::Password,
                // advance() yields only prompt stages or Linked.
                _ => return Ok(self.linked(phone).await),
            };

            let answer = read_input(kind)
                .await?
                .filter(|value| !value.trim().is_empty());
            let Some(answer) = answer else {
                info!(phone, %stage, "operator cancelled account link");
                return Ok(LinkOutcome::Abandoned { stage });
            };

            let request = match kind {
                PromptKind::Code => FinalizeRequest {
                    phone: phone.to_owned(),
                    code: Some(answer.trim().to_owned()),
                    password: None,
                },
                PromptKind::Password => FinalizeRequest {
                    phone: phone.to_owned(),
                    code: None,
                    password: Some(answer),
                },
            };
            signal = LinkSignal::classify(self.client.finalize_account(&request).await);
        }
    }

    async fn linked(&self, phone: &str) -> LinkOutcome {
        info!(phone, "account linked");
        LinkOutcome::Linked {
            accounts: self.refresh().await,
        }
    }

    async fn fail(&self, phone: &str, stage: LinkStage, reason: String) -> LinkOutcome {
        warn!(phone, %stage, %reason, "account link failed");
        LinkOutcome::Failed {
            stage,
            reason,
            accounts: self.refresh().await,
        }
    }

    async fn refresh(&self) -> Option<Vec<Account>> {
        match self.client.list_accounts().await {
            Ok(accounts) => Some(accounts),
            Err(err) => {
                warn!(error = %err, "account list refresh failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use httpmock::Mock;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::future::{ready, Ready};
    use std::sync::{Arc, Mutex};

    const PHONE: &str = "+15551234567";

    type Asked = Arc<Mutex<Vec<PromptKind>>>;

    /// Operator stand-in answering prompts in order; records what was asked.
    fn scripted(
        answers: &[Option<&str>],
    ) -> (
        Asked,
        impl FnMut(PromptKind) -> Ready<Result<Option<String>, LinkError>>,
    ) {
        let asked: Asked = Arc::new(Mutex::new(Vec::new()));
        let mut answers: VecDeque<Option<String>> = answers
            .iter()
            .map(|answer| answer.map(str::to_owned))
            .collect();
        let log = asked.clone();
        let input = move |kind| {
            log.lock().unwrap().push(kind);
            ready(Ok(answers.pop_front().flatten()))
        };
        (asked, input)
    }

    fn controller(server: &MockServer) -> LinkController {
        LinkController::new(EchoApiClient::with_base_url(&server.base_url()).unwrap())
    }

    fn mock_add<'a>(server: &'a MockServer, status: u16, body: serde_json::Value) -> Mock<'a> {
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/accounts/add")
                .json_body(json!({ "phone": PHONE }));
            then.status(status).json_body(body);
        })
    }

    fn mock_finalize<'a>(
        server: &'a MockServer,
        request: serde_json::Value,
        status: u16,
        body: serde_json::Value,
    ) -> Mock<'a> {
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/accounts/finalize")
                .json_body(request);
            then.status(status).json_body(body);
        })
    }

    fn mock_accounts(server: &MockServer) -> Mock<'_> {
        server.mock(|when, then| {
            when.method(GET).path("/api/accounts");
            then.status(200).json_body(json!([{ "phone": PHONE, "username": "ada" }]));
        })
    }

    #[tokio::test]
    async fn code_then_linked_takes_two_calls_and_one_refresh() {
        let server = MockServer::start();
        let add = mock_add(
            &server,
            200,
            json!({ "status": "ok", "message": "Verification code sent" }),
        );
        let finalize = mock_finalize(
            &server,
            json!({ "phone": PHONE, "code": "12345", "password": null }),
            200,
            json!({ "status": "ok", "message": "Account added successfully" }),
        );
        let accounts = mock_accounts(&server);

        let (asked, input) = scripted(&[Some("12345")]);
        let outcome = controller(&server).run(PHONE, input).await.unwrap();

        add.assert_hits(1);
        finalize.assert_hits(1);
        accounts.assert_hits(1);
        assert_eq!(*asked.lock().unwrap(), vec![PromptKind::Code]);
        assert_eq!(outcome.stage(), LinkStage::Linked);
        match outcome {
            LinkOutcome::Linked { accounts } => {
                assert_eq!(accounts.unwrap()[0].phone, PHONE);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn password_requested_after_code() {
        let server = MockServer::start();
        let add = mock_add(
            &server,
            200,
            json!({ "status": "ok", "message": "Verification code sent" }),
        );
        let with_code = mock_finalize(
            &server,
            json!({ "phone": PHONE, "code": "12345", "password": null }),
            401,
            json!({ "status": "error", "message": "2FA password required" }),
        );
        let with_password = mock_finalize(
            &server,
            json!({ "phone": PHONE, "code": null, "password": "hunter2" }),
            200,
            json!({ "status": "ok", "message": "Account added successfully" }),
        );
        let accounts = mock_accounts(&server);

        let (asked, input) = scripted(&[Some("12345"), Some("hunter2")]);
        let outcome = controller(&server).run(PHONE, input).await.unwrap();

        add.assert_hits(1);
        with_code.assert_hits(1);
        with_password.assert_hits(1);
        accounts.assert_hits(1);
        assert_eq!(
            *asked.lock().unwrap(),
            vec![PromptKind::Code, PromptKind::Password]
        );
        assert_eq!(outcome.stage(), LinkStage::Linked);
    }

    #[tokio::test]
    async fn password_requested_by_add() {
        let server = MockServer::start();
        let add = mock_add(
            &server,
            401,
            json!({ "status": "error", "message": "2FA password required" }),
        );
        let with_password = mock_finalize(
            &server,
            json!({ "phone": PHONE, "code": null, "password": "hunter2" }),
            200,
            json!({ "status": "ok", "message": "Account added successfully" }),
        );
        let accounts = mock_accounts(&server);

        let (asked, input) = scripted(&[Some("hunter2")]);
        let outcome = controller(&server).run(PHONE, input).await.unwrap();

        add.assert_hits(1);
        with_password.assert_hits(1);
        accounts.assert_hits(1);
        assert_eq!(*asked.lock().unwrap(), vec![PromptKind::Password]);
        assert_eq!(outcome.stage(), LinkStage::Linked);
    }

    #[tokio::test]
    async fn already_authorized_links_without_prompt() {
        let server = MockServer::start();
        let add = mock_add(
            &server,
            200,
            json!({ "status": "ok", "message": "Account is already authorized" }),
        );
        let accounts = mock_accounts(&server);

        let (asked, input) = scripted(&[]);
        let outcome = controller(&server).run(PHONE, input).await.unwrap();

        add.assert_hits(1);
        accounts.assert_hits(1);
        assert!(asked.lock().unwrap().is_empty());
        assert_eq!(outcome.stage(), LinkStage::Linked);
    }

    #[tokio::test]
    async fn tagged_reply_drives_transitions() {
        let server = MockServer::start();
        mock_add(
            &server,
            200,
            json!({ "outcome": "code_required", "detail": "check your app" }),
        );
        let finalize = mock_finalize(
            &server,
            json!({ "phone": PHONE, "code": "777", "password": null }),
            200,
            json!({ "outcome": "linked", "detail": "welcome" }),
        );
        mock_accounts(&server);

        let (_, input) = scripted(&[Some(" 777 ")]);
        let outcome = controller(&server).run(PHONE, input).await.unwrap();

        finalize.assert_hits(1);
        assert_eq!(outcome.stage(), LinkStage::Linked);
    }

    #[tokio::test]
    async fn cancelled_code_prompt_makes_no_more_calls() {
        let server = MockServer::start();
        let add = mock_add(
            &server,
            200,
            json!({ "status": "ok", "message": "Verification code sent" }),
        );
        let finalize = server.mock(|when, then| {
            when.method(POST).path("/api/accounts/finalize");
            then.status(200).json_body(json!({ "status": "ok" }));
        });
        let accounts = mock_accounts(&server);

        let (_, input) = scripted(&[None]);
        let outcome = controller(&server).run(PHONE, input).await.unwrap();

        add.assert_hits(1);
        finalize.assert_hits(0);
        accounts.assert_hits(0);
        assert!(matches!(
            outcome,
            LinkOutcome::Abandoned {
                stage: LinkStage::CodeRequested
            }
        ));
    }

    #[tokio::test]
    async fn blank_password_abandons() {
        let server = MockServer::start();
        mock_add(
            &server,
            401,
            json!({ "status": "error", "message": "2FA password required" }),
        );
        let finalize = server.mock(|when, then| {
            when.method(POST).path("/api/accounts/finalize");
            then.status(200).json_body(json!({ "status": "ok" }));
        });
        let accounts = mock_accounts(&server);

        let (_, input) = scripted(&[Some("   ")]);
        let outcome = controller(&server).run(PHONE, input).await.unwrap();

        finalize.assert_hits(0);
        accounts.assert_hits(0);
        assert_eq!(outcome.stage(), LinkStage::PasswordRequested);
    }

    #[tokio::test]
    async fn cancelled_password_prompt_after_code_makes_no_more_calls() {
        let server = MockServer::start();
        let add = mock_add(
            &server,
            200,
            json!({ "status": "ok", "message": "Verification code sent" }),
        );
        let with_code = mock_finalize(
            &server,
            json!({ "phone": PHONE, "code": "12345", "password": null }),
            401,
            json!({ "status": "error", "message": "2FA password required" }),
        );
        let with_password = server.mock(|when, then| {
            when.method(POST)
                .path("/api/accounts/finalize")
                .body_contains(r#""code":null"#);
            then.status(200).json_body(json!({ "status": "ok" }));
        });
        let accounts = mock_accounts(&server);

        let (asked, input) = scripted(&[Some("12345"), None]);
        let outcome = controller(&server).run(PHONE, input).await.unwrap();

        add.assert_hits(1);
        with_code.assert_hits(1);
        with_password.assert_hits(0);
        accounts.assert_hits(0);
        assert_eq!(
            *asked.lock().unwrap(),
            vec![PromptKind::Code, PromptKind::Password]
        );
        assert!(matches!(
            outcome,
            LinkOutcome::Abandoned {
                stage: LinkStage::PasswordRequested
            }
        ));
    }

    #[tokio::test]
    async fn repeated_password_request_fails_with_server_text() {
        let server = MockServer::start();
        mock_add(
            &server,
            401,
            json!({ "status": "error", "message": "2FA password required" }),
        );
        mock_finalize(
            &server,
            json!({ "phone": PHONE, "code": null, "password": "nope" }),
            401,
            json!({ "status": "error", "message": "Wrong 2FA password, password required" }),
        );
        let accounts = mock_accounts(&server);

        let (asked, input) = scripted(&[Some("nope"), Some("again")]);
        let outcome = controller(&server).run(PHONE, input).await.unwrap();

        accounts.assert_hits(1);
        assert_eq!(asked.lock().unwrap().len(), 1);
        match outcome {
            LinkOutcome::Failed { stage, reason, .. } => {
                assert_eq!(stage, LinkStage::PasswordRequested);
                assert_eq!(reason, "Wrong 2FA password, password required");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_phone_makes_no_calls() {
        let server = MockServer::start();
        let add = server.mock(|when, then| {
            when.method(POST).path("/api/accounts/add");
            then.status(200).json_body(json!({ "status": "ok" }));
        });

        let (asked, input) = scripted(&[]);
        let outcome = controller(&server).run("  ", input).await.unwrap();

        add.assert_hits(0);
        assert!(asked.lock().unwrap().is_empty());
        assert_eq!(outcome.stage(), LinkStage::Start);
    }

    #[tokio::test]
    async fn wrong_code_fails_with_server_message_and_refreshes() {
        let server = MockServer::start();
        mock_add(
            &server,
            200,
            json!({ "status": "ok", "message": "Verification code sent" }),
        );
        mock_finalize(
            &server,
            json!({ "phone": PHONE, "code": "00000", "password": null }),
            400,
            json!({ "status": "error", "message": "The confirmation code is invalid" }),
        );
        let accounts = mock_accounts(&server);

        let (_, input) = scripted(&[Some("00000")]);
        let outcome = controller(&server).run(PHONE, input).await.unwrap();

        accounts.assert_hits(1);
        match outcome {
            LinkOutcome::Failed {
                stage,
                reason,
                accounts,
            } => {
                assert_eq!(stage, LinkStage::CodeRequested);
                assert_eq!(reason, "The confirmation code is invalid");
                assert!(accounts.is_some());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_password_fails() {
        let server = MockServer::start();
        mock_add(
            &server,
            401,
            json!({ "status": "error", "message": "2FA password required" }),
        );
        let with_password = mock_finalize(
            &server,
            json!({ "phone": PHONE, "code": null, "password": "nope" }),
            400,
            json!({ "status": "error", "message": "Invalid password" }),
        );
        let accounts = mock_accounts(&server);

        let (asked, input) = scripted(&[Some("nope"), Some("again")]);
        let outcome = controller(&server).run(PHONE, input).await.unwrap();

        with_password.assert_hits(1);
        accounts.assert_hits(1);
        assert_eq!(asked.lock().unwrap().len(), 1);
        assert_eq!(outcome.stage(), LinkStage::Failed);
    }

    #[tokio::test]
    async fn failed_refresh_still_reports_outcome() {
        let server = MockServer::start();
        mock_add(
            &server,
            200,
            json!({ "status": "ok", "message": "Account is already authorized" }),
        );
        server.mock(|when, then| {
            when.method(GET).path("/api/accounts");
            then.status(500).body("boom");
        });

        let (_, input) = scripted(&[]);
        let outcome = controller(&server).run(PHONE, input).await.unwrap();
        assert!(matches!(outcome, LinkOutcome::Linked { accounts: None }));
    }

    #[tokio::test]
    async fn second_session_is_rejected_while_one_is_active() {
        let server = MockServer::start();
        let add = server.mock(|when, then| {
            when.method(POST).path("/api/accounts/add");
            then.status(200)
                .json_body(json!({ "status": "ok", "message": "Account is already authorized" }));
        });
        mock_accounts(&server);

        let controller = controller(&server);
        let held = controller.slot.acquire("+15550000000").unwrap();

        let (_, input) = scripted(&[]);
        let err = controller.run(PHONE, input).await.unwrap_err();
        assert!(matches!(err, LinkError::SessionActive { ref phone } if phone == "+15550000000"));
        add.assert_hits(0);

        drop(held);
        let (_, input) = scripted(&[]);
        let outcome = controller.run(PHONE, input).await.unwrap();
        assert_eq!(outcome.stage(), LinkStage::Linked);
        assert!(controller.active_phone().is_none());
    }

    #[tokio::test]
    async fn clones_share_the_session_slot() {
        let server = MockServer::start();
        let first = controller(&server);
        let second = first.clone();
        let _held = first.slot.acquire(PHONE).unwrap();
        assert_eq!(second.active_phone().as_deref(), Some(PHONE));
    }
}

use std::io::{self, Write};

use echo_core::linking::{LinkError, PromptKind};
use tokio::task;

/// Print `label` and read one line from stdin. Blank input or EOF is `None`.
pub async fn prompt_line(label: impl Into<String>) -> io::Result<Option<String>> {
    let label = label.into();
    task::spawn_blocking(move || {
        print!("{label}");
        io::stdout().flush()?;
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        let input = input.trim_end_matches(['\r', '\n']).to_owned();
        if input.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(input))
        }
    })
    .await
    .map_err(io::Error::other)?
}

/// Ask for the secret the linking controller needs next.
pub async fn prompt_for_secret(kind: PromptKind) -> Result<Option<String>, LinkError> {
    let label = match kind {
        PromptKind::Code => "Enter the code you received in the messaging app: ",
        PromptKind::Password => {
            "This account has two-factor authentication enabled. Enter the password: "
        }
    };
    Ok(prompt_line(label).await?)
}

pub async fn confirm(question: &str) -> io::Result<bool> {
    let answer = prompt_line(format!("{question} [y/N]: ")).await?;
    Ok(matches!(
        answer.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref(),
        Some("y" | "yes")
    ))
}

//! Interactive completion of album metadata missing from the page.

use std::io::{self, BufRead, IsTerminal, Write};

use albumdl_core::orchestrator::{MetadataField, MetadataPrompt};
use async_trait::async_trait;
use indicatif::MultiProgress;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Asks on stdin when stdin is a terminal; answers nothing otherwise.
pub(crate) struct StdinPrompt {
    bars: Option<MultiProgress>,
    cancel: CancellationToken,
}

impl StdinPrompt {
    pub(crate) fn new(bars: Option<MultiProgress>, cancel: CancellationToken) -> Self {
        Self { bars, cancel }
    }
}

#[async_trait]
impl MetadataPrompt for StdinPrompt {
    async fn ask(&self, field: MetadataField) -> Option<String> {
        if !io::stdin().is_terminal() {
            debug!(field = field.label(), "stdin is not a terminal, leaving field empty");
            return None;
        }

        let question = question(field);
        let bars = self.bars.clone();
        let read = tokio::task::spawn_blocking(move || match bars {
            Some(bars) => bars.suspend(|| read_answer(&question)),
            None => read_answer(&question),
        });

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            answer = read => answer.ok().flatten(),
        }
    }
}

fn question(field: MetadataField) -> String {
    match field {
        MetadataField::Year => format!(
            "Unable to get {}. Please enter here (may leave blank): ",
            field.label()
        ),
        _ => format!("Unable to get {}. Please enter here: ", field.label()),
    }
}

fn read_answer(question: &str) -> Option<String> {
    let mut stderr = io::stderr();
    let _ = write!(stderr, "{question}");
    let _ = stderr.flush();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_question_allows_blank() {
        assert!(question(MetadataField::Year).contains("may leave blank"));
        assert!(question(MetadataField::Artist).contains("ARTIST NAME"));
        assert!(!question(MetadataField::Title).contains("blank"));
    }
}

//! `tfprobe id` command handler

use std::io::Write;

use serde::Serialize;

use tfprobe_core::config::ProbeConfig;
use tfprobe_lifecycle::{IdentityGenerator, LifecycleError};
use tfprobe_lifecycle::identity::DEFAULT_IDENTITY_LENGTH;

use crate::cli::IdArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `id` command.
///
/// The length comes from `--length`, then `identity.length` of a loadable
/// suite file, then the built-in default.
pub fn execute(
    args: IdArgs,
    config: Option<&ProbeConfig>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let length = args
        .length
        .or_else(|| config.map(|c| c.identity.length))
        .unwrap_or(DEFAULT_IDENTITY_LENGTH);

    let report = generate(args.count, length)?;
    writer.render(&report)?;
    Ok(())
}

fn generate(count: usize, length: usize) -> Result<IdReport, LifecycleError> {
    let generator = IdentityGenerator::new(length)?;
    let ids = (0..count)
        .map(|_| generator.generate().map(|id| id.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(IdReport { length, ids })
}

/// Generated identities.
#[derive(Serialize)]
pub struct IdReport {
    pub length: usize,
    pub ids: Vec<String>,
}

impl Render for IdReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for id in &self.ids {
            writeln!(w, "{id}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_distinct_ids_of_requested_length() {
        let report = generate(50, 10).expect("generation succeeds");
        assert_eq!(report.ids.len(), 50);
        assert!(report.ids.iter().all(|id| id.len() == 10));

        let mut unique = report.ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 50);
    }

    #[test]
    fn test_generate_rejects_bad_length() {
        let err = generate(1, 2).err().expect("length 2 is too short");
        assert!(err.to_string().contains("length 2"));
    }

    #[test]
    fn test_render_text_one_per_line() {
        let report = IdReport {
            length: 5,
            ids: vec!["28424".to_owned(), "a1b2c".to_owned()],
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        assert_eq!(String::from_utf8(buffer).expect("utf8"), "28424\na1b2c\n");
    }
}

//! Run flows behind the `selmap` binary.
//!
//! The browser is launched lazily through a caller-supplied closure, only
//! once there is work to do, and is shut down on every path after launch.

use std::future::Future;
use std::path::PathBuf;

use anyhow::bail;

use selmap::{
    write_batch_output, write_single_output, LabelValue, Orchestrator, RecordsFile, Renderer,
    RunOptions, SelectorStore, UrlRepository,
};

/// Fully resolved command-line inputs.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub url: Option<String>,
    /// URL list; batch mode when set.
    pub records: Option<PathBuf>,
    pub template: PathBuf,
    pub out: PathBuf,
    pub learn: bool,
    pub apply: bool,
    pub nav_timeout_ms: u64,
}

/// What a run did, for the binary to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Template and output both exist and no refresh was asked for.
    NothingToDo,
    /// Batch mode with an empty or missing records file.
    NoUrls(PathBuf),
    Single { learned: bool, applied: bool },
    Batch { learned: bool },
}

/// Run the single-page or batch flow for `args`.
pub async fn run<F, Fut, R>(
    args: &RunArgs,
    labels: &[LabelValue],
    launch: F,
) -> anyhow::Result<RunOutcome>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<R>>,
    R: Renderer,
{
    let store = SelectorStore::new(&args.template);
    let options = RunOptions {
        force_learn: args.learn,
        nav_timeout_ms: args.nav_timeout_ms,
    };

    if let Some(records) = &args.records {
        let repo = RecordsFile::new(records);
        if repo.urls()?.is_empty() {
            return Ok(RunOutcome::NoUrls(records.clone()));
        }

        let renderer = launch().await?;
        let outcome: anyhow::Result<RunOutcome> = async {
            let orchestrator = Orchestrator::new(&renderer, &store, options);
            let learned = orchestrator.needs_learning();
            let records = orchestrator.run_batch(&repo, labels).await?;
            write_batch_output(&args.out, &records)?;
            Ok(RunOutcome::Batch { learned })
        }
        .await;
        shutdown(&renderer).await;
        return outcome;
    }

    let Some(url) = args.url.as_deref() else {
        bail!("--url is required when --records is not specified");
    };

    let apply = args.apply || !args.out.exists();
    if !args.learn && store.exists() && !apply {
        tracing::info!("Template and output already exist; pass --learn or --apply to refresh");
        return Ok(RunOutcome::NothingToDo);
    }

    let renderer = launch().await?;
    let outcome: anyhow::Result<RunOutcome> = async {
        let run = Orchestrator::new(&renderer, &store, options)
            .run_single(url, labels, apply)
            .await?;
        if let Some(result) = &run.applied {
            write_single_output(&args.out, result)?;
        }
        Ok(RunOutcome::Single {
            learned: run.learned,
            applied: run.applied.is_some(),
        })
    }
    .await;
    shutdown(&renderer).await;
    outcome
}

async fn shutdown(renderer: &dyn Renderer) {
    if let Err(e) = renderer.shutdown().await {
        tracing::warn!("Browser shutdown failed: {e:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selmap::{extract_labels, ReplayRenderer};
    use std::cell::Cell;
    use std::path::Path;

    const URL: &str = "https://report.test/r?id=1&t=0";
    const PAGE: &str = r#"<body><p>Report</p><p class="weight">Weight <b>62.5 kg</b></p></body>"#;

    fn args(dir: &Path) -> RunArgs {
        RunArgs {
            url: Some(URL.into()),
            records: None,
            template: dir.join("selectors_template.json"),
            out: dir.join("mapped_labels.json"),
            learn: false,
            apply: false,
            nav_timeout_ms: 1_000,
        }
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_nothing_to_do_never_launches() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path());
        std::fs::write(&args.template, r#"{ "url": "", "selectors": {} }"#).unwrap();
        std::fs::write(&args.out, r#"{ "labels": {} }"#).unwrap();

        let launched = Cell::new(false);
        let outcome = run(&args, &[], || {
            launched.set(true);
            async { anyhow::Ok(ReplayRenderer::new()) }
        })
        .await
        .unwrap();

        assert_eq!(outcome, RunOutcome::NothingToDo);
        assert!(!launched.get());
    }

    #[tokio::test]
    async fn test_batch_without_urls_never_launches() {
        let dir = tempfile::tempdir().unwrap();
        let records = dir.path().join("records.txt");
        std::fs::write(&records, "# nothing yet\n\n").unwrap();

        for path in [records.clone(), dir.path().join("missing.txt")] {
            let args = RunArgs {
                records: Some(path.clone()),
                ..args(dir.path())
            };
            let launched = Cell::new(false);
            let outcome = run(&args, &[], || {
                launched.set(true);
                async { anyhow::Ok(ReplayRenderer::new()) }
            })
            .await
            .unwrap();

            assert_eq!(outcome, RunOutcome::NoUrls(path));
            assert!(!launched.get());
        }
        assert!(!dir.path().join("mapped_labels.json").exists());
    }

    #[tokio::test]
    async fn test_single_mode_requires_url() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            url: None,
            ..args(dir.path())
        };
        let err = run(&args, &[], || async { anyhow::Ok(ReplayRenderer::new()) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--url"));
    }

    #[tokio::test]
    async fn test_single_learns_applies_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path());
        let labels = extract_labels("Weight: 62.5 kg\nHeight: 171.0 cm\n");

        let outcome = run(&args, &labels, || async {
            anyhow::Ok(ReplayRenderer::new().with_page(URL, PAGE))
        })
        .await
        .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Single {
                learned: true,
                applied: true
            }
        );
        let template = read_json(&args.template);
        assert_eq!(
            template["selectors"]["Weight"]["selector"],
            "p.weight:nth-of-type(2) > b:nth-of-type(1)"
        );
        assert_eq!(template["selectors"]["Height"]["selector"], "");
        let out = read_json(&args.out);
        assert_eq!(out["labels"]["Weight"], 62.5);
        assert!(out["labels"]["Height"].is_null());
    }

    #[tokio::test]
    async fn test_relearn_keeps_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            learn: true,
            ..args(dir.path())
        };
        std::fs::write(&args.out, r#"{ "labels": { "Weight": 1.0 } }"#).unwrap();
        let labels = extract_labels("Weight: 62.5 kg\n");

        let outcome = run(&args, &labels, || async {
            anyhow::Ok(ReplayRenderer::new().with_page(URL, PAGE))
        })
        .await
        .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Single {
                learned: true,
                applied: false
            }
        );
        assert!(args.template.exists());
        assert_eq!(read_json(&args.out)["labels"]["Weight"], 1.0);
    }

    #[tokio::test]
    async fn test_batch_writes_dated_records() {
        let dir = tempfile::tempdir().unwrap();
        let records = dir.path().join("records.txt");
        std::fs::write(&records, format!("{URL}\nhttps://report.test/r?id=2\n")).unwrap();
        let args = RunArgs {
            url: None,
            records: Some(records),
            ..args(dir.path())
        };
        let labels = extract_labels("Weight: 62.5 kg\n");

        let outcome = run(&args, &labels, || async {
            anyhow::Ok(ReplayRenderer::new()
                .with_page(URL, PAGE)
                .with_page("https://report.test/r?id=2", PAGE))
        })
        .await
        .unwrap();

        assert_eq!(outcome, RunOutcome::Batch { learned: true });
        let out = read_json(&args.out);
        assert_eq!(out["records"]["1970-01-01"][0]["labels"]["Weight"], 62.5);
        assert_eq!(out["records"]["unknown"][0]["url"], "https://report.test/r?id=2");
    }
}

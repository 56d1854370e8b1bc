//! Integration test: batch file -> external trainer -> output directory
//!
//! Tests the complete pipeline the CLI drives:
//! 1. Load batch YAML and config
//! 2. Run each repetition as a child process
//! 3. Write ledger, echoed batch and report
//!
//! Toyota Way: Genchi Genbutsu (go and see the files on disk)

#![cfg(unix)]

use std::fs;
use std::path::Path;
use trueno_lab::config::load_config;
use trueno_lab::device::DeviceAllocator;
use trueno_lab::ledger::ResultsLedger;
use trueno_lab::output::BatchOutput;
use trueno_lab::report::{BatchReport, FailureKind, RunStatus};
use trueno_lab::storage::{Dataset, DatasetId};
use trueno_lab::trainer::CommandTrainer;
use trueno_lab::{BatchSpec, Error, ExperimentScheduler, SeedPair};

const BATCH: &str = r"
experiments:
  - - shallow
    - train_data_file: train.parquet
      test_data_file: test.parquet
      depth: 1
  - - deep
    - train_data_file: train.parquet
      test_data_file: test.parquet
      depth: 8
";

/// Reads the specification from stdin and reports its seeds back.
const TRAINER_SCRIPT: &str = r#"
spec=$(cat)
case "$spec" in
  *'"depth":8'*) echo "out of memory" >&2; exit 3 ;;
esac
echo "epoch 1 done"
echo "{\"headers\":[\"seed\",\"aux\"],\"values\":[$TRUENO_LAB_PRIMARY_SEED,$TRUENO_LAB_AUXILIARY_SEED]}"
"#;

fn empty_loader(id: &DatasetId) -> trueno_lab::Result<Dataset> {
    Ok(Dataset::empty(id.clone()))
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("lab.toml");
    let config = format!(
        "output_dir = \"{}\"\n\n[[seeds]]\ntf_seed = 1\nnp_seed = 10\n\n[[seeds]]\ntf_seed = 2\nnp_seed = 20\n\n[devices]\ncount = 1\n\n[trainer]\nprogram = \"sh\"\nargs = [\"-c\", \'\'\'{TRAINER_SCRIPT}\'\'\']\n",
        dir.join("out").display()
    );
    fs::write(&path, config).unwrap();
    path
}

#[test]
fn test_command_trainer_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let batch_path = dir.path().join("sweep.yml");
    fs::write(&batch_path, BATCH).unwrap();

    let config = load_config(Some(&write_config(dir.path())), None).unwrap();
    config.validate().unwrap();
    let batch = BatchSpec::load(&batch_path).unwrap();
    assert_eq!(batch.name(), "sweep");

    let output = BatchOutput::prepare(&config.output_dir, batch.name()).unwrap();
    output.echo_spec(&batch).unwrap();
    let ledger = ResultsLedger::create(output.results_path()).unwrap();
    let program = config.trainer.program.clone().unwrap();
    let trainer = CommandTrainer::new(program, config.trainer.args.clone());

    let mut scheduler = ExperimentScheduler::builder(empty_loader, trainer, ledger)
        .devices(DeviceAllocator::from_config(&config.devices))
        .build();
    let report = scheduler.run(&batch, &config.seeds).unwrap();
    output.write_report(&report).unwrap();

    let ledger_text = fs::read_to_string(output.results_path()).unwrap();
    let lines: Vec<_> = ledger_text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "file,experiment,rep,specifications,seed,aux",
            r#"sweep,shallow,0,{"train_data_file":"train.parquet";"test_data_file":"test.parquet";"depth":1},1,10"#,
            r#"sweep,shallow,1,{"train_data_file":"train.parquet";"test_data_file":"test.parquet";"depth":1},2,20"#,
        ]
    );

    assert_eq!(report.failure_count(FailureKind::Trainer), 2);
    assert!(report.failures()[0].detail.message.contains("exit status: 3"));
    let deep = report.runs_for_experiment("deep");
    assert!(deep.iter().all(|r| r.status() == RunStatus::Failed));

    let echoed = fs::read_to_string(output.spec_path()).unwrap();
    assert_eq!(BatchSpec::from_yaml("sweep", &echoed).unwrap(), batch);

    let report_json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output.report_path()).unwrap()).unwrap();
    assert_eq!(report_json["batch"], "sweep");
    assert_eq!(report_json["progress"]["completed"], 4);
    assert_eq!(report_json["runs"].as_array().unwrap().len(), 4);
}

#[test]
fn test_missing_trainer_program_is_a_failure_not_a_crash() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = ResultsLedger::create(dir.path().join("results.csv")).unwrap();
    let batch = BatchSpec::from_yaml("demo", BATCH).unwrap();
    let trainer = CommandTrainer::new("/nonexistent/trainer", Vec::new());

    let mut scheduler = ExperimentScheduler::builder(empty_loader, trainer, ledger).build();
    let report = scheduler.run(&batch, &[SeedPair::new(1, 1)]).unwrap();

    assert_eq!(report.failure_count(FailureKind::Trainer), 2);
    assert!(report.failures()[0]
        .detail
        .trace
        .contains("failed to spawn trainer"));
}

/// Interrupts itself on repetition 1, the way Ctrl-C reaches the whole process group.
const SELF_INTERRUPTING_SCRIPT: &str = r#"
cat > /dev/null
if [ "$TRUENO_LAB_REPETITION" = 1 ]; then kill -INT $$; fi
echo "{\"headers\":[\"seed\"],\"values\":[$TRUENO_LAB_PRIMARY_SEED]}"
"#;

#[test]
fn test_interrupted_trainer_stops_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = ResultsLedger::create(dir.path().join("results.csv")).unwrap();
    let batch = BatchSpec::from_yaml("demo", BATCH).unwrap();
    let trainer = CommandTrainer::new(
        "sh",
        vec!["-c".to_string(), SELF_INTERRUPTING_SCRIPT.to_string()],
    );
    let seeds: Vec<SeedPair> = (1..=3).map(|i| SeedPair::new(i, i)).collect();

    let mut scheduler = ExperimentScheduler::builder(empty_loader, trainer, ledger).build();
    let mut report = BatchReport::new(batch.name(), batch.len() * seeds.len());
    let err = scheduler.run_with_report(&batch, &seeds, &mut report).unwrap_err();

    assert!(matches!(err, Error::Cancelled { completed: 1 }));
    let ledger_text = fs::read_to_string(scheduler.ledger().path()).unwrap();
    assert_eq!(
        ledger_text.lines().collect::<Vec<_>>(),
        vec![
            "file,experiment,rep,specifications,seed",
            r#"demo,shallow,0,{"train_data_file":"train.parquet";"test_data_file":"test.parquet";"depth":1},1"#,
        ]
    );
    assert!(report.failures().is_empty());
    assert_eq!(report.rows_logged(), 1);
    assert!(report
        .runs()
        .iter()
        .any(|r| r.repetition() == 1 && r.status() == RunStatus::Cancelled));
}

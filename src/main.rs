use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ezbatch_config::{Platform, Settings};
use ezbatch_job::MountValidator;
use ezbatch_remote::{
  BatchAdmin, ComputeEnvironmentSpec, DryRunJobControl, JobControl, LocationProbe, QueueSpec,
  StaticProbe,
};
use ezbatch_workflow::{WordPairIds, Workflow};

/// ezbatch - submit dependency-ordered container workflows to AWS Batch
#[derive(Parser)]
#[command(name = "ezbatch")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the settings file (default: $EZBATCH_CONFIG_PATH or the platform config dir)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Manage the settings file
  Config {
    #[command(subcommand)]
    action: ConfigAction,
  },

  /// Inspect or submit a workflow snapshot
  Workflow {
    #[command(subcommand)]
    action: WorkflowAction,
  },

  /// Manage compute environments
  #[command(name = "compute-environment")]
  ComputeEnvironment {
    #[command(subcommand)]
    action: ComputeEnvironmentAction,
  },

  /// Manage job queues
  Queue {
    #[command(subcommand)]
    action: QueueAction,
  },
}

#[derive(Subcommand)]
enum ConfigAction {
  /// Write default settings if the file does not exist
  Init,
  /// Print the effective settings
  Show,
}

#[derive(Subcommand)]
enum WorkflowAction {
  /// Load a snapshot and validate its jobs and mounts
  Validate {
    /// Path to the workflow snapshot (JSON)
    workflow_file: PathBuf,
  },

  /// Print the submission order, one job per line
  Order { workflow_file: PathBuf },

  /// Print the job definition each job translates to
  Definitions { workflow_file: PathBuf },

  /// Submit the workflow
  Submit {
    workflow_file: PathBuf,

    /// Queue for jobs without their own (default: settings.default_queue)
    #[arg(long)]
    queue: Option<String>,

    /// Record the calls instead of making them
    #[arg(long)]
    dry_run: bool,
  },
}

#[derive(Subcommand)]
enum ComputeEnvironmentAction {
  /// Create an enabled managed compute environment
  Create {
    name: String,

    /// FARGATE or EC2
    #[arg(long, default_value = "FARGATE")]
    platform: Platform,

    /// Maximum vCPUs (default: settings.max_vcpus)
    #[arg(long)]
    max_vcpus: Option<u32>,

    /// Subnet to launch into, repeatable (default: settings.subnets)
    #[arg(long = "subnet")]
    subnets: Vec<String>,

    /// Security group, repeatable (default: settings.security_group_ids)
    #[arg(long = "security-group")]
    security_group_ids: Vec<String>,

    /// Service role ARN (default: settings.service_role)
    #[arg(long)]
    service_role: Option<String>,

    /// Tag as KEY=VALUE, repeatable
    #[arg(long = "tag", value_parser = parse_tag)]
    tags: Vec<(String, String)>,
  },

  /// List compute environments as JSON
  List,

  /// Switch a compute environment between ENABLED and DISABLED
  Toggle { name: String },

  /// Delete a compute environment
  Delete { name: String },
}

#[derive(Subcommand)]
enum QueueAction {
  /// Create an enabled job queue fed by one compute environment
  Create {
    name: String,

    /// Compute environment name or ARN
    compute_environment: String,

    /// Tag as KEY=VALUE, repeatable
    #[arg(long = "tag", value_parser = parse_tag)]
    tags: Vec<(String, String)>,
  },

  /// List job queues as JSON
  List,

  /// Switch a job queue between ENABLED and DISABLED
  Toggle { name: String },

  /// Delete a job queue
  Delete { name: String },
}

fn parse_tag(value: &str) -> Result<(String, String), String> {
  match value.split_once('=') {
    Some((key, tag)) if !key.is_empty() => Ok((key.to_string(), tag.to_string())),
    _ => Err(format!("expected KEY=VALUE, got {value:?}")),
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let config_path = match cli.config {
    Some(path) => path,
    None => Settings::default_path().context("could not determine settings location")?,
  };

  match cli.command {
    Some(Commands::Config { action }) => match action {
      ConfigAction::Init => {
        Settings::load_or_init(&config_path)
          .with_context(|| format!("failed to initialize {}", config_path.display()))?;
        println!("{}", config_path.display());
      }
      ConfigAction::Show => {
        let settings = read_settings(&config_path)?;
        print!("{}", settings.to_toml()?);
      }
    },
    Some(Commands::Workflow { action }) => {
      let settings = read_settings(&config_path)?;
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { run_workflow_action(action, &settings).await })?;
    }
    Some(Commands::ComputeEnvironment { action }) => {
      let settings = read_settings(&config_path)?;
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async {
        let (admin, settings) = connect_admin(&settings).await?;
        run_compute_environment_action(action, admin.as_ref(), &settings).await
      })?;
    }
    Some(Commands::Queue { action }) => {
      let settings = read_settings(&config_path)?;
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async {
        let (admin, _) = connect_admin(&settings).await?;
        run_queue_action(action, admin.as_ref()).await
      })?;
    }
    None => {
      println!("ezbatch - use --help to see available commands");
    }
  }

  Ok(())
}

/// Settings from `path`, or the defaults if it does not exist.
fn read_settings(path: &Path) -> Result<Settings> {
  if !path.exists() {
    return Ok(Settings::default());
  }
  Settings::load(path).with_context(|| format!("failed to load settings from {}", path.display()))
}

async fn run_workflow_action(action: WorkflowAction, settings: &Settings) -> Result<()> {
  match action {
    WorkflowAction::Validate { workflow_file } => validate_workflow(&workflow_file, settings).await,
    WorkflowAction::Order { workflow_file } => {
      let workflow = read_workflow(&workflow_file).await?;
      for key in workflow.submission_order()? {
        println!("{key}");
      }
      Ok(())
    }
    WorkflowAction::Definitions { workflow_file } => {
      let workflow = read_workflow(&workflow_file).await?;
      let definitions: BTreeMap<_, _> = workflow
        .jobs()
        .iter()
        .map(|(key, job)| (key.as_str(), job.to_definition()))
        .collect();
      println!("{}", serde_json::to_string_pretty(&definitions)?);
      Ok(())
    }
    WorkflowAction::Submit {
      workflow_file,
      queue,
      dry_run,
    } => {
      let queue = queue.or_else(|| settings.default_queue.clone());
      if dry_run {
        let control = DryRunJobControl::new();
        let probe = StaticProbe::permissive();
        submit_workflow(&workflow_file, &control, &probe, settings, queue.as_deref()).await
      } else {
        submit_live(&workflow_file, settings, queue.as_deref()).await
      }
    }
  }
}

async fn read_workflow(path: &Path) -> Result<Workflow> {
  Workflow::read(path)
    .await
    .with_context(|| format!("failed to read workflow: {}", path.display()))
}

async fn validate_workflow(path: &Path, settings: &Settings) -> Result<()> {
  #[cfg(feature = "aws")]
  let probe = {
    let sdk_config = ezbatch_remote::aws::load_sdk_config(settings).await;
    ezbatch_remote::aws::S3Probe::new(&sdk_config)
  };
  #[cfg(not(feature = "aws"))]
  let probe = {
    tracing::warn!("built without the aws feature, object store locations are not probed");
    StaticProbe::permissive()
  };

  let validator = MountValidator::new(&probe, settings);
  let workflow = Workflow::load(path, &validator)
    .await
    .with_context(|| format!("invalid workflow: {}", path.display()))?;
  let order = workflow
    .submission_order()
    .context("workflow cannot be ordered")?;

  println!("{}: {} jobs", workflow.name(), workflow.jobs().len());
  println!("order: {}", order.join(" -> "));
  Ok(())
}

async fn submit_workflow(
  path: &Path,
  control: &dyn JobControl,
  probe: &dyn LocationProbe,
  settings: &Settings,
  queue: Option<&str>,
) -> Result<()> {
  let validator = MountValidator::new(probe, settings);
  let mut workflow = Workflow::load(path, &validator)
    .await
    .with_context(|| format!("invalid workflow: {}", path.display()))?;

  let record = workflow
    .submit(control, &WordPairIds::new(), queue)
    .await
    .with_context(|| format!("failed to submit workflow {}", workflow.name()))?;

  println!("{}", serde_json::to_string_pretty(&record)?);
  Ok(())
}

#[cfg(feature = "aws")]
async fn submit_live(path: &Path, settings: &Settings, queue: Option<&str>) -> Result<()> {
  use ezbatch_remote::aws::{BatchJobControl, S3Probe, load_sdk_config, resolve_account_defaults};

  let sdk_config = load_sdk_config(settings).await;
  let settings = resolve_account_defaults(&sdk_config, settings)
    .await
    .context("failed to resolve default roles")?;
  let control = BatchJobControl::new(&sdk_config, &settings);
  let probe = S3Probe::new(&sdk_config);
  submit_workflow(path, &control, &probe, &settings, queue).await
}

#[cfg(not(feature = "aws"))]
async fn submit_live(_path: &Path, _settings: &Settings, _queue: Option<&str>) -> Result<()> {
  tracing::warn!("refusing to submit: no live backend");
  anyhow::bail!("ezbatch was built without the `aws` feature; rebuild with `--features aws` or pass --dry-run")
}

async fn run_compute_environment_action(
  action: ComputeEnvironmentAction,
  admin: &dyn BatchAdmin,
  settings: &Settings,
) -> Result<()> {
  match action {
    ComputeEnvironmentAction::Create {
      name,
      platform,
      max_vcpus,
      subnets,
      security_group_ids,
      service_role,
      tags,
    } => {
      let mut spec = ComputeEnvironmentSpec::from_settings(name, platform, settings);
      if let Some(max_vcpus) = max_vcpus {
        spec.max_vcpus = max_vcpus;
      }
      if !subnets.is_empty() {
        spec.subnets = subnets;
      }
      if !security_group_ids.is_empty() {
        spec.security_group_ids = security_group_ids;
      }
      if service_role.is_some() {
        spec.service_role = service_role;
      }
      spec.tags = tags.into_iter().collect();

      let arn = admin
        .create_compute_environment(&spec)
        .await
        .with_context(|| format!("failed to create compute environment {}", spec.name))?;
      println!("{arn}");
    }
    ComputeEnvironmentAction::List => {
      let environments = admin.compute_environments().await?;
      println!("{}", serde_json::to_string_pretty(&environments)?);
    }
    ComputeEnvironmentAction::Toggle { name } => {
      let state = admin.toggle_compute_environment(&name).await?;
      println!("compute environment {name} is now {state}");
    }
    ComputeEnvironmentAction::Delete { name } => {
      admin
        .delete_compute_environment(&name)
        .await
        .with_context(|| format!("failed to delete compute environment {name}"))?;
    }
  }
  Ok(())
}

async fn run_queue_action(action: QueueAction, admin: &dyn BatchAdmin) -> Result<()> {
  match action {
    QueueAction::Create {
      name,
      compute_environment,
      tags,
    } => {
      let spec = QueueSpec {
        name,
        compute_environment,
        tags: tags.into_iter().collect(),
      };
      let arn = admin
        .create_queue(&spec)
        .await
        .with_context(|| format!("failed to create job queue {}", spec.name))?;
      println!("{arn}");
    }
    QueueAction::List => {
      let queues = admin.queues().await?;
      println!("{}", serde_json::to_string_pretty(&queues)?);
    }
    QueueAction::Toggle { name } => {
      let state = admin.toggle_queue(&name).await?;
      println!("job queue {name} is now {state}");
    }
    QueueAction::Delete { name } => {
      admin
        .delete_queue(&name)
        .await
        .with_context(|| format!("failed to delete job queue {name}"))?;
    }
  }
  Ok(())
}

/// The batch admin backend, with settings whose unset roles are filled from
/// the caller's account.
#[cfg(feature = "aws")]
async fn connect_admin(settings: &Settings) -> Result<(Box<dyn BatchAdmin>, Settings)> {
  use ezbatch_remote::aws::{BatchAdminClient, load_sdk_config, resolve_account_defaults};

  let sdk_config = load_sdk_config(settings).await;
  let settings = resolve_account_defaults(&sdk_config, settings)
    .await
    .context("failed to resolve default roles")?;
  Ok((Box::new(BatchAdminClient::new(&sdk_config)), settings))
}

#[cfg(not(feature = "aws"))]
async fn connect_admin(_settings: &Settings) -> Result<(Box<dyn BatchAdmin>, Settings)> {
  anyhow::bail!("ezbatch was built without the `aws` feature; rebuild with `--features aws` to manage compute environments and queues")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_tag() {
    assert_eq!(
      parse_tag("team=data").unwrap(),
      ("team".to_string(), "data".to_string())
    );
    assert_eq!(
      parse_tag("note=a=b").unwrap(),
      ("note".to_string(), "a=b".to_string())
    );
    assert!(parse_tag("team").is_err());
    assert!(parse_tag("=data").is_err());
  }

  #[test]
  fn test_cli_parses_admin_commands() {
    let cli = Cli::try_parse_from([
      "ezbatch",
      "compute-environment",
      "create",
      "env",
      "--platform",
      "ec2",
      "--subnet",
      "subnet-1",
      "--subnet",
      "subnet-2",
      "--tag",
      "team=data",
    ])
    .unwrap();
    let Some(Commands::ComputeEnvironment {
      action: ComputeEnvironmentAction::Create {
        name,
        platform,
        subnets,
        tags,
        max_vcpus,
        ..
      },
    }) = cli.command
    else {
      panic!("expected compute-environment create");
    };
    assert_eq!(name, "env");
    assert_eq!(platform, Platform::Ec2);
    assert_eq!(subnets, vec!["subnet-1", "subnet-2"]);
    assert_eq!(tags, vec![("team".to_string(), "data".to_string())]);
    assert_eq!(max_vcpus, None);

    let cli = Cli::try_parse_from(["ezbatch", "queue", "toggle", "DefaultFargateQueue"]).unwrap();
    assert!(matches!(
      cli.command,
      Some(Commands::Queue { action: QueueAction::Toggle { name } }) if name == "DefaultFargateQueue"
    ));
  }
}

//! AWS Batch, S3 and STS implementations of the boundary traits.
//!
//! Job definitions are registered as `container` definitions carrying ECS task
//! properties with one essential container.

use async_trait::async_trait;
use aws_sdk_batch::types::{
  AssignPublicIp, CeState, CeType, ComputeEnvironmentDetail, ComputeEnvironmentOrder,
  ComputeResource, CrType, EcsProperties, EcsTaskProperties, EphemeralStorage, JobDefinitionType,
  JobDependency, JobQueueDetail, JobStateTimeLimitAction, JobStateTimeLimitActionsAction,
  JobStateTimeLimitActionsState, JobStatus, JqState, KeyValuePair, LogConfiguration, LogDriver,
  NetworkConfiguration, PlatformCapability, ResourceType, RuntimePlatform,
  TaskContainerProperties,
};
use aws_sdk_s3::primitives::ByteStream;
use ezbatch_config::{Platform, ServerSideEncryption, Settings};
use tracing::{info, warn};

use crate::admin::{
  BatchAdmin, ComputeEnvironmentSpec, ComputeEnvironmentSummary, QueueSpec, QueueSummary,
  ResourceState,
};
use crate::control::{JobControl, SubmitRequest};
use crate::error::{Operation, RemoteError};
use crate::payload::{JobDefinitionPayload, ResourceKind};
use crate::probe::{LocationProbe, ObjectLocation};

/// Job states in which a queued job still holds its name.
const ACTIVE_JOB_STATUSES: [JobStatus; 5] = [
  JobStatus::Submitted,
  JobStatus::Pending,
  JobStatus::Runnable,
  JobStatus::Starting,
  JobStatus::Running,
];

const QUEUE_PRIORITY: i32 = 1;

/// Jobs stuck RUNNABLE for one of these reasons are cancelled after
/// [`RUNNABLE_TIMEOUT_SECS`].
const MISCONFIGURATION_REASONS: [&str; 2] = [
  "MISCONFIGURATION:COMPUTE_ENVIRONMENT_MAX_RESOURCE",
  "MISCONFIGURATION:JOB_RESOURCE_REQUIREMENT",
];
const RUNNABLE_TIMEOUT_SECS: i32 = 600;

/// Load the shared AWS configuration, honouring `Settings::region`.
pub async fn load_sdk_config(settings: &Settings) -> aws_config::SdkConfig {
  let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
  if let Some(region) = &settings.region {
    loader = loader.region(aws_config::Region::new(region.clone()));
  }
  loader.load().await
}

/// `settings` with every unset role derived from the caller's account.
///
/// The caller identity is only looked up when at least one role is unset.
pub async fn resolve_account_defaults(
  sdk_config: &aws_config::SdkConfig,
  settings: &Settings,
) -> Result<Settings, RemoteError> {
  if !settings.has_unset_roles() {
    return Ok(settings.clone());
  }
  let err = remote(Operation::ResolveAccount);
  let identity = aws_sdk_sts::Client::new(sdk_config)
    .get_caller_identity()
    .send()
    .await
    .map_err(|e| err(e.to_string()))?;
  let account = identity
    .account()
    .ok_or_else(|| err("caller identity has no account".to_string()))?;
  info!(%account, "role defaults resolved from caller account");
  Ok(settings.with_account_defaults(account))
}

fn remote(operation: Operation) -> impl Fn(String) -> RemoteError {
  move |message| RemoteError::new(operation, message)
}

/// [`JobControl`] backed by AWS Batch.
#[derive(Debug, Clone)]
pub struct BatchJobControl {
  client: aws_sdk_batch::Client,
  execution_role_arn: Option<String>,
  task_role_arn: Option<String>,
}

impl BatchJobControl {
  pub fn new(sdk_config: &aws_config::SdkConfig, settings: &Settings) -> Self {
    Self {
      client: aws_sdk_batch::Client::new(sdk_config),
      execution_role_arn: settings.execution_role_arn.clone(),
      task_role_arn: settings.task_role_arn.clone(),
    }
  }

  /// Deregister every ACTIVE definition already registered under `name`.
  async fn deregister_existing(&self, name: &str) -> Result<(), RemoteError> {
    let err = remote(Operation::RegisterDefinition);
    let mut stale = Vec::new();
    let mut next_token = None;
    loop {
      let page = self
        .client
        .describe_job_definitions()
        .job_definition_name(name)
        .status("ACTIVE")
        .set_next_token(next_token.take())
        .send()
        .await
        .map_err(|e| err(format!("failed to describe existing definitions: {e}")))?;
      stale.extend(
        page
          .job_definitions()
          .iter()
          .filter(|definition| definition.job_definition_name() == name)
          .map(|definition| definition.job_definition_arn().to_string()),
      );
      match page.next_token() {
        Some(token) => next_token = Some(token.to_string()),
        None => break,
      }
    }

    for arn in stale {
      warn!(%name, %arn, "deregistering stale definition with the same name");
      self.deregister_definition(&arn).await?;
    }
    Ok(())
  }

  /// Whether a job named `name` is still queued or running in `queue`.
  async fn name_in_use(&self, queue: &str, name: &str) -> Result<bool, RemoteError> {
    let err = remote(Operation::SubmitJob);
    for status in ACTIVE_JOB_STATUSES {
      let mut next_token = None;
      loop {
        let page = self
          .client
          .list_jobs()
          .job_queue(queue)
          .job_status(status.clone())
          .set_next_token(next_token.take())
          .send()
          .await
          .map_err(|e| err(format!("failed to list {} jobs in queue: {e}", status.as_str())))?;
        if page.job_summary_list().iter().any(|job| job.job_name() == name) {
          return Ok(true);
        }
        match page.next_token() {
          Some(token) => next_token = Some(token.to_string()),
          None => break,
        }
      }
    }
    Ok(false)
  }

  fn ecs_properties(&self, payload: &JobDefinitionPayload) -> Result<EcsProperties, RemoteError> {
    let err = remote(Operation::RegisterDefinition);
    let build = |e: aws_sdk_batch::error::BuildError| err(format!("invalid definition: {e}"));

    let mut resources = Vec::with_capacity(payload.resources.len());
    for requirement in &payload.resources {
      let kind = match requirement.kind {
        ResourceKind::Vcpu => ResourceType::Vcpu,
        ResourceKind::Memory => ResourceType::Memory,
      };
      resources.push(
        aws_sdk_batch::types::ResourceRequirement::builder()
          .r#type(kind)
          .value(&requirement.value)
          .build()
          .map_err(build)?,
      );
    }

    let environment = payload
      .environment
      .iter()
      .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
      .collect();

    let container = TaskContainerProperties::builder()
      .name(&payload.container_name)
      .image(&payload.image)
      .set_command(Some(payload.command.clone()))
      .set_environment(Some(environment))
      .set_resource_requirements(Some(resources))
      .essential(true)
      .log_configuration(
        LogConfiguration::builder()
          .log_driver(LogDriver::Awslogs)
          .build()
          .map_err(build)?,
      )
      .build()
      .map_err(build)?;

    let mut task = EcsTaskProperties::builder()
      .containers(container)
      .set_execution_role_arn(self.execution_role_arn.clone())
      .set_task_role_arn(self.task_role_arn.clone());

    if payload.platform == Platform::Fargate {
      task = task
        .platform_version("LATEST")
        .network_configuration(
          NetworkConfiguration::builder()
            .assign_public_ip(AssignPublicIp::Disabled)
            .build(),
        )
        .runtime_platform(
          RuntimePlatform::builder()
            .operating_system_family("LINUX")
            .cpu_architecture("X86_64")
            .build(),
        );
    }

    if let Some(size) = payload.storage_request_gib()? {
      task = task.ephemeral_storage(
        EphemeralStorage::builder()
          .size_in_gib(size)
          .build()
          .map_err(build)?,
      );
    }

    EcsProperties::builder()
      .task_properties(task.build().map_err(build)?)
      .build()
      .map_err(build)
  }
}

#[async_trait]
impl JobControl for BatchJobControl {
  async fn register_definition(
    &self,
    payload: &JobDefinitionPayload,
  ) -> Result<String, RemoteError> {
    if payload.platform == Platform::Fargate && self.execution_role_arn.is_none() {
      return Err(RemoteError::new(
        Operation::RegisterDefinition,
        format!(
          "{} targets Fargate, which needs an execution role; set execution_role_arn",
          payload.job_name
        ),
      ));
    }
    self.deregister_existing(&payload.job_name).await?;

    let capability = match payload.platform {
      Platform::Fargate => PlatformCapability::Fargate,
      Platform::Ec2 => PlatformCapability::Ec2,
    };
    let response = self
      .client
      .register_job_definition()
      .job_definition_name(&payload.job_name)
      .r#type(JobDefinitionType::Container)
      .set_tags(Some(payload.tags.clone().into_iter().collect()))
      .platform_capabilities(capability)
      .ecs_properties(self.ecs_properties(payload)?)
      .propagate_tags(true)
      .send()
      .await
      .map_err(|e| RemoteError::new(Operation::RegisterDefinition, e.to_string()))?;

    let arn = response.job_definition_arn().to_string();
    info!(job_name = %payload.job_name, %arn, "job definition registered");
    Ok(arn)
  }

  async fn deregister_definition(&self, definition_id: &str) -> Result<(), RemoteError> {
    self
      .client
      .deregister_job_definition()
      .job_definition(definition_id)
      .send()
      .await
      .map_err(|e| RemoteError::new(Operation::DeregisterDefinition, e.to_string()))?;
    Ok(())
  }

  async fn submit_job(&self, request: &SubmitRequest<'_>) -> Result<String, RemoteError> {
    let err = remote(Operation::SubmitJob);

    if self.name_in_use(request.queue, request.name).await? {
      return Err(err(format!(
        "job {} already exists in queue {}",
        request.name, request.queue
      )));
    }

    let depends_on = request
      .depends_on
      .iter()
      .map(|id| JobDependency::builder().job_id(id).build())
      .collect();

    let response = self
      .client
      .submit_job()
      .job_name(request.name)
      .job_queue(request.queue)
      .job_definition(request.definition_id)
      .set_depends_on(Some(depends_on))
      .set_tags(Some(request.tags.clone().into_iter().collect()))
      .send()
      .await
      .map_err(|e| err(e.to_string()))?;

    Ok(response.job_id().to_string())
  }
}

/// [`BatchAdmin`] backed by AWS Batch.
#[derive(Debug, Clone)]
pub struct BatchAdminClient {
  client: aws_sdk_batch::Client,
}

impl BatchAdminClient {
  pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
    Self {
      client: aws_sdk_batch::Client::new(sdk_config),
    }
  }

  /// Every compute environment, or just `name` when given. Environments the
  /// service reports without a state or compute resources are skipped.
  async fn describe_compute_environments(
    &self,
    name: Option<&str>,
  ) -> Result<Vec<ComputeEnvironmentSummary>, RemoteError> {
    let err = remote(Operation::DescribeComputeEnvironments);
    let mut summaries = Vec::new();
    let mut next_token = None;
    loop {
      let page = self
        .client
        .describe_compute_environments()
        .set_compute_environments(name.map(|n| vec![n.to_string()]))
        .set_next_token(next_token.take())
        .send()
        .await
        .map_err(|e| err(e.to_string()))?;
      summaries.extend(
        page
          .compute_environments()
          .iter()
          .filter_map(summarize_compute_environment),
      );
      match page.next_token() {
        Some(token) => next_token = Some(token.to_string()),
        None => break,
      }
    }
    Ok(summaries)
  }

  /// Every job queue, or just `name` when given.
  async fn describe_queues(&self, name: Option<&str>) -> Result<Vec<QueueSummary>, RemoteError> {
    let err = remote(Operation::DescribeQueues);
    let mut summaries = Vec::new();
    let mut next_token = None;
    loop {
      let page = self
        .client
        .describe_job_queues()
        .set_job_queues(name.map(|n| vec![n.to_string()]))
        .set_next_token(next_token.take())
        .send()
        .await
        .map_err(|e| err(e.to_string()))?;
      summaries.extend(page.job_queues().iter().filter_map(summarize_queue));
      match page.next_token() {
        Some(token) => next_token = Some(token.to_string()),
        None => break,
      }
    }
    Ok(summaries)
  }

  /// ARN of the compute environment a new queue should draw from.
  async fn compute_environment_arn(&self, name_or_arn: &str) -> Result<String, RemoteError> {
    if name_or_arn.starts_with("arn:") {
      return Ok(name_or_arn.to_string());
    }
    self
      .compute_environment(name_or_arn)
      .await?
      .map(|environment| environment.arn)
      .ok_or_else(|| {
        RemoteError::new(
          Operation::CreateQueue,
          format!("compute environment {name_or_arn} does not exist"),
        )
      })
  }
}

fn summarize_compute_environment(
  detail: &ComputeEnvironmentDetail,
) -> Option<ComputeEnvironmentSummary> {
  let state = ResourceState::parse(detail.state()?.as_str())?;
  let resources = detail.compute_resources()?;
  let kind: Option<&CrType> = resources.r#type().into();
  let max_vcpus: Option<i32> = resources.maxv_cpus().into();
  Some(ComputeEnvironmentSummary {
    name: detail.compute_environment_name().to_string(),
    arn: detail.compute_environment_arn().to_string(),
    state,
    kind: kind?.as_str().to_string(),
    max_vcpus: max_vcpus.and_then(|v| u32::try_from(v).ok()),
  })
}

fn summarize_queue(detail: &JobQueueDetail) -> Option<QueueSummary> {
  let state = ResourceState::parse(detail.state()?.as_str())?;
  let priority: Option<i32> = detail.priority().into();
  let compute_environment = detail.compute_environment_order().first().and_then(|order| {
    let arn: Option<&str> = order.compute_environment().into();
    arn.and_then(|arn| arn.rsplit('/').next()).map(str::to_string)
  });
  Some(QueueSummary {
    name: detail.job_queue_name().to_string(),
    arn: detail.job_queue_arn().to_string(),
    state,
    priority,
    status: detail.status().map(|status| status.as_str().to_string()),
    compute_environment,
  })
}

fn ce_state(state: ResourceState) -> CeState {
  match state {
    ResourceState::Enabled => CeState::Enabled,
    ResourceState::Disabled => CeState::Disabled,
  }
}

fn jq_state(state: ResourceState) -> JqState {
  match state {
    ResourceState::Enabled => JqState::Enabled,
    ResourceState::Disabled => JqState::Disabled,
  }
}

#[async_trait]
impl BatchAdmin for BatchAdminClient {
  async fn create_compute_environment(
    &self,
    spec: &ComputeEnvironmentSpec,
  ) -> Result<String, RemoteError> {
    let err = remote(Operation::CreateComputeEnvironment);
    let max_vcpus = i32::try_from(spec.max_vcpus)
      .map_err(|_| err(format!("max vCPUs {} is out of range", spec.max_vcpus)))?;

    let mut resources = ComputeResource::builder()
      .maxv_cpus(max_vcpus)
      .set_subnets(Some(spec.subnets.clone()))
      .set_security_group_ids(Some(spec.security_group_ids.clone()));
    resources = match spec.platform {
      Platform::Fargate => resources.r#type(CrType::Fargate),
      Platform::Ec2 => resources
        .r#type(CrType::Ec2)
        .minv_cpus(0)
        .instance_types("optimal")
        .set_instance_role(spec.instance_role.clone())
        .set_tags(Some(spec.tags.clone().into_iter().collect())),
    };
    let resources = resources
      .build()
      .map_err(|e| err(format!("invalid compute resources: {e}")))?;

    let response = self
      .client
      .create_compute_environment()
      .compute_environment_name(&spec.name)
      .r#type(CeType::Managed)
      .state(CeState::Enabled)
      .set_service_role(spec.service_role.clone())
      .compute_resources(resources)
      .set_tags(Some(spec.tags.clone().into_iter().collect()))
      .send()
      .await
      .map_err(|e| err(e.to_string()))?;

    let arn: Option<&str> = response.compute_environment_arn().into();
    let arn = arn.unwrap_or(spec.name.as_str()).to_string();
    info!(name = %spec.name, platform = %spec.platform, %arn, "compute_environment_created");
    Ok(arn)
  }

  async fn compute_environments(&self) -> Result<Vec<ComputeEnvironmentSummary>, RemoteError> {
    self.describe_compute_environments(None).await
  }

  async fn compute_environment(
    &self,
    name: &str,
  ) -> Result<Option<ComputeEnvironmentSummary>, RemoteError> {
    Ok(
      self
        .describe_compute_environments(Some(name))
        .await?
        .into_iter()
        .next(),
    )
  }

  async fn set_compute_environment_state(
    &self,
    name: &str,
    state: ResourceState,
  ) -> Result<(), RemoteError> {
    self
      .client
      .update_compute_environment()
      .compute_environment(name)
      .state(ce_state(state))
      .send()
      .await
      .map_err(|e| RemoteError::new(Operation::UpdateComputeEnvironment, e.to_string()))?;
    Ok(())
  }

  async fn delete_compute_environment(&self, name: &str) -> Result<(), RemoteError> {
    self
      .client
      .delete_compute_environment()
      .compute_environment(name)
      .send()
      .await
      .map_err(|e| RemoteError::new(Operation::DeleteComputeEnvironment, e.to_string()))?;
    info!(compute_environment = %name, "compute_environment_deleted");
    Ok(())
  }

  async fn create_queue(&self, spec: &QueueSpec) -> Result<String, RemoteError> {
    let err = remote(Operation::CreateQueue);
    let build = |e: aws_sdk_batch::error::BuildError| err(format!("invalid job queue: {e}"));

    let compute_environment = self.compute_environment_arn(&spec.compute_environment).await?;
    let order = ComputeEnvironmentOrder::builder()
      .order(1)
      .compute_environment(compute_environment)
      .build()
      .map_err(build)?;

    let mut request = self
      .client
      .create_job_queue()
      .job_queue_name(&spec.name)
      .state(JqState::Enabled)
      .priority(QUEUE_PRIORITY)
      .compute_environment_order(order)
      .set_tags(Some(spec.tags.clone().into_iter().collect()));
    for reason in MISCONFIGURATION_REASONS {
      request = request.job_state_time_limit_actions(
        JobStateTimeLimitAction::builder()
          .reason(reason)
          .state(JobStateTimeLimitActionsState::Runnable)
          .max_time_seconds(RUNNABLE_TIMEOUT_SECS)
          .action(JobStateTimeLimitActionsAction::Cancel)
          .build()
          .map_err(build)?,
      );
    }

    let response = request.send().await.map_err(|e| err(e.to_string()))?;
    let arn = response.job_queue_arn().to_string();
    info!(name = %spec.name, compute_environment = %spec.compute_environment, %arn, "queue_created");
    Ok(arn)
  }

  async fn queues(&self) -> Result<Vec<QueueSummary>, RemoteError> {
    self.describe_queues(None).await
  }

  async fn queue(&self, name: &str) -> Result<Option<QueueSummary>, RemoteError> {
    Ok(self.describe_queues(Some(name)).await?.into_iter().next())
  }

  async fn set_queue_state(&self, name: &str, state: ResourceState) -> Result<(), RemoteError> {
    self
      .client
      .update_job_queue()
      .job_queue(name)
      .state(jq_state(state))
      .send()
      .await
      .map_err(|e| RemoteError::new(Operation::UpdateQueue, e.to_string()))?;
    Ok(())
  }

  async fn delete_queue(&self, name: &str) -> Result<(), RemoteError> {
    if self.queue(name).await?.is_none() {
      return Err(RemoteError::new(
        Operation::DeleteQueue,
        format!("job queue {name} does not exist"),
      ));
    }
    self
      .client
      .delete_job_queue()
      .job_queue(name)
      .send()
      .await
      .map_err(|e| RemoteError::new(Operation::DeleteQueue, e.to_string()))?;
    info!(queue = %name, "queue_deleted");
    Ok(())
  }
}

/// [`LocationProbe`] backed by S3.
#[derive(Debug, Clone)]
pub struct S3Probe {
  client: aws_sdk_s3::Client,
}

impl S3Probe {
  pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
    Self {
      client: aws_sdk_s3::Client::new(sdk_config),
    }
  }

  /// Remove the probe object, including its version if the bucket is versioned.
  async fn remove_probe_object(&self, bucket: &str, key: &str) -> Result<(), RemoteError> {
    let err = remote(Operation::ProbeWrite);
    let versions = self
      .client
      .list_object_versions()
      .bucket(bucket)
      .prefix(key)
      .send()
      .await
      .map_err(|e| err(e.to_string()))?;

    let version_id = versions
      .versions()
      .first()
      .and_then(|v| v.version_id())
      .filter(|id| *id != "null")
      .map(str::to_string);

    self
      .client
      .delete_object()
      .bucket(bucket)
      .key(key)
      .set_version_id(version_id)
      .send()
      .await
      .map_err(|e| err(e.to_string()))?;
    Ok(())
  }
}

#[async_trait]
impl LocationProbe for S3Probe {
  async fn readable(&self, location: &ObjectLocation) -> Result<bool, RemoteError> {
    let response = self
      .client
      .list_objects_v2()
      .bucket(&location.bucket)
      .prefix(&location.prefix)
      .max_keys(10)
      .send()
      .await
      .map_err(|e| RemoteError::new(Operation::ProbeRead, e.to_string()))?;
    Ok(!response.contents().is_empty())
  }

  async fn writable(
    &self,
    bucket: &str,
    encryption: ServerSideEncryption,
    kms_key_id: Option<&str>,
  ) -> Result<bool, RemoteError> {
    let key = format!("test/{}", uuid::Uuid::new_v4().simple());
    let sse = match encryption {
      ServerSideEncryption::None => None,
      ServerSideEncryption::Aes256 => Some(aws_sdk_s3::types::ServerSideEncryption::Aes256),
      ServerSideEncryption::Kms => Some(aws_sdk_s3::types::ServerSideEncryption::AwsKms),
      ServerSideEncryption::KmsDsse => Some(aws_sdk_s3::types::ServerSideEncryption::AwsKmsDsse),
    };

    let put = self
      .client
      .put_object()
      .bucket(bucket)
      .key(&key)
      .body(ByteStream::from_static(b"test"))
      .set_server_side_encryption(sse)
      .set_ssekms_key_id(kms_key_id.map(str::to_string))
      .send()
      .await;

    let result = match put {
      Ok(_) => Ok(true),
      // The service answered and said no.
      Err(aws_sdk_s3::error::SdkError::ServiceError(e)) => {
        warn!(%bucket, error = ?e.err(), "write probe rejected");
        Ok(false)
      }
      Err(e) => Err(RemoteError::new(Operation::ProbeWrite, e.to_string())),
    };

    if let Err(e) = self.remove_probe_object(bucket, &key).await {
      warn!(%bucket, %key, error = %e, "failed to remove write probe object");
    }
    result
  }
}

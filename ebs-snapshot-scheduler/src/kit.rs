//! Deploys the scheduler: uploads its artifacts to S3 and manages its CloudFormation stack.

use anyhow::{anyhow, Context, Result};
use aws_config::SdkConfig;
use aws_sdk_cloudformation::types::{Capability, Parameter, Stack, Tag};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Default name of the scheduler's CloudFormation stack.
pub const DEFAULT_STACK_NAME: &str = "EBS-SnapShot-Scheduler";
/// Key prefix, within the bucket, of everything the scheduler stack needs.
pub const ARTIFACT_PREFIX: &str = "Scheduler";

/// Region S3 creates buckets in when no location constraint is given.
const S3_DEFAULT_REGION: &str = "us-east-1";
/// Name the Lambda `provided` runtimes execute.
const LAMBDA_ENTRY: &str = "bootstrap";

/// Everything needed to create the scheduler stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDefinition {
    pub stack_name: String,
    pub bucket: String,
    pub template_file: String,
    /// Comma separated instance ids handed to the template.
    pub instances: String,
    pub tags: Vec<(String, String)>,
}

impl StackDefinition {
    pub fn template_url(&self) -> String {
        format!(
            "https://s3.amazonaws.com/{}/{ARTIFACT_PREFIX}/{}",
            self.bucket, self.template_file
        )
    }

    pub fn parameters(&self) -> Vec<(&'static str, &str)> {
        vec![("S3Bucket", &self.bucket), ("Instances", &self.instances)]
    }
}

pub struct Kit {
    cloudformation: aws_sdk_cloudformation::Client,
    s3: aws_sdk_s3::Client,
    sts: aws_sdk_sts::Client,
}

impl Kit {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Kit {
            cloudformation: aws_sdk_cloudformation::Client::new(sdk_config),
            s3: aws_sdk_s3::Client::new(sdk_config),
            sts: aws_sdk_sts::Client::new(sdk_config),
        }
    }

    /// Name of the identity running the kit, reduced to word characters, for the `builder` tag.
    pub async fn caller_name(&self) -> Result<String> {
        let identity = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .context("Failed to get caller identity")?;
        let arn = identity
            .arn()
            .ok_or_else(|| anyhow!("caller identity has no ARN"))?;
        Ok(builder_name(arn))
    }

    pub async fn upload_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        self.s3
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| {
                format!("Failed to upload {} to s3://{bucket}/{key}", path.display())
            })?;
        tracing::info!("Uploaded {} to s3://{bucket}/{key}", path.display());
        Ok(())
    }

    /// Returns the id of the new stack.
    pub async fn create_stack(&self, definition: &StackDefinition) -> Result<String> {
        let mut request = self
            .cloudformation
            .create_stack()
            .stack_name(&definition.stack_name)
            .template_url(definition.template_url())
            .capabilities(Capability::CapabilityNamedIam);
        for (key, value) in definition.parameters() {
            request = request.parameters(
                Parameter::builder()
                    .parameter_key(key)
                    .parameter_value(value)
                    .build(),
            );
        }
        for (key, value) in &definition.tags {
            request = request.tags(Tag::builder().key(key).value(value).build()?);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to create stack {}", definition.stack_name))?;
        tracing::debug!("Create Stack Response: {response:?}");
        Ok(response.stack_id().unwrap_or_default().to_owned())
    }

    pub async fn describe_stack(&self, stack_name: &str) -> Result<Stack> {
        let response = self
            .cloudformation
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
            .with_context(|| format!("Failed to describe stack {stack_name}"))?;
        response
            .stacks()
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("stack {stack_name} not found"))
    }

    pub async fn delete_stack(&self, stack_name: &str) -> Result<()> {
        let response = self
            .cloudformation
            .delete_stack()
            .stack_name(stack_name)
            .send()
            .await
            .with_context(|| format!("Failed to delete stack {stack_name}"))?;
        tracing::info!("Delete Response: {response:?}");
        Ok(())
    }

    /// Creates `bucket` unless it already exists and is accessible. Returns true if it was created.
    pub async fn ensure_bucket(&self, bucket: &str, region: &str) -> Result<bool> {
        match self.s3.head_bucket().bucket(bucket).send().await {
            Ok(_) => {
                tracing::debug!("Bucket '{bucket}' already exists in '{region}'");
                return Ok(false);
            }
            Err(err) => tracing::debug!("Bucket check for '{bucket}': {err}"),
        }

        let mut request = self.s3.create_bucket().bucket(bucket);
        if region != S3_DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to create bucket {bucket} in {region}"))?;
        tracing::debug!("Create Bucket Response: {response:?}");
        Ok(true)
    }

    /// Uploads every syncable file under `root`, keyed by its path relative to `root`.
    pub async fn sync_dir(&self, bucket: &str, root: &Path) -> Result<usize> {
        let files = syncable_files(root)?;
        for (path, key) in &files {
            self.upload_file(bucket, key, path).await?;
        }
        Ok(files.len())
    }
}

/// `arn:aws:iam::123456789012:user/jane.doe` becomes `janedoe`.
pub fn builder_name(arn: &str) -> String {
    arn.rsplit(['/', ':'])
        .next()
        .unwrap_or(arn)
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Parses a `Key=Value` command line tag.
pub fn parse_tag(tag: &str) -> Result<(String, String)> {
    match tag.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(anyhow!("tag {tag:?} must be formatted as Key=Value")),
    }
}

/// Zips the Lambda executable at `binary` into `package` as `bootstrap`, replacing any
/// previous package. Returns the entry names written.
pub fn package_lambda(binary: &Path, package: &Path) -> Result<Vec<String>> {
    if package.exists() {
        std::fs::remove_file(package)
            .with_context(|| format!("Failed to remove old package {}", package.display()))?;
    }
    let contents =
        std::fs::read(binary).with_context(|| format!("Failed to read {}", binary.display()))?;
    let file = File::create(package)
        .with_context(|| format!("Failed to create {}", package.display()))?;

    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file(LAMBDA_ENTRY, options)?;
    zip.write_all(&contents)?;
    zip.finish()?;
    tracing::info!("  adding: {LAMBDA_ENTRY} (deflated)");

    Ok(vec![LAMBDA_ENTRY.to_owned()])
}

/// Files under `root` paired with their S3 keys, sorted by key.
///
/// `.DS_Store` files, symlinks and the top level `debug` directory are skipped.
pub fn syncable_files(root: &Path) -> Result<Vec<(PathBuf, String)>> {
    let mut files = vec![];
    collect_files(root, root, &mut files)?;
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<(PathBuf, String)>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let relative = path.strip_prefix(root)?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if relative != Path::new("debug") {
                collect_files(root, &path, files)?;
            }
        } else if file_type.is_file() && path.file_name().is_some_and(|name| name != ".DS_Store") {
            let key = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((path, key));
        }
    }
    Ok(())
}

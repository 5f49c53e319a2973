use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use clap::{Parser, Subcommand};
use ebs_snapshot_scheduler::kit::{
    package_lambda, parse_tag, Kit, StackDefinition, ARTIFACT_PREFIX, DEFAULT_STACK_NAME,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Deploys, describes and deletes the EBS snapshot scheduler stack.
#[derive(Parser)]
#[clap(version)]
struct Args {
    /// AWS region to work in.
    #[clap(long, global = true, default_value = "us-east-1")]
    region: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload the scheduler package and template, then create the scheduler stack.
    Create {
        /// S3 bucket the template and package are uploaded to.
        #[clap(long)]
        s3bucket: String,

        /// Comma separated list of instance ids.
        #[clap(long)]
        instances: String,

        /// Name of the scheduler stack.
        #[clap(long, default_value = DEFAULT_STACK_NAME)]
        stackname: String,

        /// CloudFormation template of the scheduler stack.
        #[clap(long, default_value = "EBS-SnapShot-Scheduler-Stack.yaml")]
        stackfile: PathBuf,

        /// Zipped Lambda package containing the `bootstrap` binary.
        #[clap(long, default_value = "EBS-SnapShot-Scheduler.zip")]
        package: PathBuf,

        /// Built Lambda executable. When given, a fresh `--package` is zipped from it first.
        #[clap(long)]
        binary: Option<PathBuf>,

        /// Tag to apply to the stack, formatted as Key=Value. May be repeated.
        #[clap(long = "tag")]
        tags: Vec<String>,

        /// Suffix the stack name with a random id so it does not collide with a real deployment.
        #[clap(long)]
        debug: bool,
    },

    /// Describe the scheduler stack.
    Describe {
        #[clap(long, default_value = DEFAULT_STACK_NAME)]
        stackname: String,
    },

    /// Delete the scheduler stack.
    Delete {
        #[clap(long, default_value = DEFAULT_STACK_NAME)]
        stackname: String,
    },

    /// Create the bucket if needed and upload a template directory into it.
    Sync {
        #[clap(long)]
        s3bucket: String,

        #[clap(long, default_value = ".")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Needed to disable anyhow stacktraces by default
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0");
    }

    let (non_blocking, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(non_blocking)
        .init();

    let start = Instant::now();
    let args = Args::parse();
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(args.region.clone()))
        .load()
        .await;
    let kit = Kit::new(&sdk_config);

    match args.command {
        Command::Create {
            s3bucket,
            instances,
            stackname,
            stackfile,
            package,
            binary,
            tags,
            debug,
        } => {
            let stack_name = if debug {
                let key = uuid::Uuid::new_v4().simple().to_string();
                format!("{stackname}-{}", &key[..8])
            } else {
                stackname
            };

            let mut stack_tags = vec![("builder".to_owned(), kit.caller_name().await?)];
            for tag in &tags {
                stack_tags.push(parse_tag(tag)?);
            }
            tracing::info!("Creating {stack_name} for instances {instances}");
            tracing::info!("Tags: {stack_tags:?}");

            if let Some(binary) = &binary {
                tracing::info!("Packaging {} into {}", binary.display(), package.display());
                package_lambda(binary, &package)?;
            }
            let package_key = format!("{ARTIFACT_PREFIX}/{}", file_name(&package)?);
            kit.upload_file(&s3bucket, &package_key, &package).await?;
            let template_file = file_name(&stackfile)?;
            let template_key = format!("{ARTIFACT_PREFIX}/{template_file}");
            kit.upload_file(&s3bucket, &template_key, &stackfile).await?;

            let definition = StackDefinition {
                stack_name: stack_name.clone(),
                bucket: s3bucket,
                template_file,
                instances,
                tags: stack_tags,
            };
            let stack_id = kit.create_stack(&definition).await?;
            tracing::info!("Created CloudFormation stack: {stack_name} ({stack_id})");
            tracing::info!(
                "EBS Create test event: {}",
                serde_json::json!({ "RequestType": "Create", "StackName": stack_name })
            );
        }
        Command::Describe { stackname } => {
            tracing::info!("Describe: {stackname}");
            let stack = kit.describe_stack(&stackname).await?;
            tracing::info!("StackName :> {:?}", stack.stack_name());
            tracing::info!("StackId :> {:?}", stack.stack_id());
            tracing::info!("Description :> {:?}", stack.description());
            tracing::info!("StackStatus :> {:?}", stack.stack_status());
            tracing::info!("CreationTime :> {:?}", stack.creation_time());
            tracing::info!("Parameters");
            for parameter in stack.parameters() {
                tracing::info!(
                    " :> {} = {}",
                    parameter.parameter_key().unwrap_or_default(),
                    parameter.parameter_value().unwrap_or_default()
                );
            }
            tracing::info!("Outputs");
            for output in stack.outputs() {
                tracing::info!(
                    " :> {} = {}",
                    output.output_key().unwrap_or_default(),
                    output.output_value().unwrap_or_default()
                );
            }
            tracing::info!("Tags");
            for tag in stack.tags() {
                tracing::info!(" :> {tag:?}");
            }
        }
        Command::Delete { stackname } => {
            tracing::info!("Delete: {stackname}");
            kit.delete_stack(&stackname).await?;
        }
        Command::Sync { s3bucket, dir } => {
            if kit.ensure_bucket(&s3bucket, &args.region).await? {
                tracing::info!("Created bucket '{s3bucket}' in region '{}'", args.region);
            }
            tracing::info!("Bucket '{s3bucket}' in region '{}' is ready.", args.region);
            let count = kit.sync_dir(&s3bucket, &dir).await?;
            tracing::info!("Uploaded {count} files to s3://{s3bucket}");
        }
    }

    tracing::info!("Completed in {:?}", start.elapsed());
    Ok(())
}

fn file_name(path: &std::path::Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} is not a file path", path.display()))
}

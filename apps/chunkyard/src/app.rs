//! Command dispatch: wires the configuration to the upload service.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chunkyard_protocol::{
    CheckRequest, ErrorBody, ErrorCode, MergeRequest, MergeResponse, UploadChunkRequest,
};
use chunkyard_transfer::{
    ChunkReader, DEFAULT_CHUNK_SIZE, UploadService, calculate_file_checksum,
};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "chunkyard", version, about = "Store file chunks and merge them into whole files")]
pub struct Cli {
    /// Configuration file (TOML).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding uploaded chunks.
    #[arg(long, global = true)]
    pub temp_root: Option<PathBuf>,

    /// Directory receiving merged files.
    #[arg(long, global = true)]
    pub output_root: Option<PathBuf>,

    /// Tracing filter, used when RUST_LOG is unset.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the stored chunk indices of a file as JSON.
    Check { file_hash: String },

    /// Store the content of a local file as one chunk.
    Put {
        file_hash: String,
        chunk_index: u32,
        file: PathBuf,
    },

    /// Merge all chunks of a file.
    Merge {
        file_name: String,
        file_hash: String,
        #[arg(allow_negative_numbers = true)]
        file_size: i64,
        #[arg(allow_negative_numbers = true)]
        chunk_size: i64,
    },

    /// Split a local file, store the chunks not yet present, then merge.
    Upload {
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Display name of the merged file (defaults to the local file name).
        #[arg(long)]
        name: Option<String>,
    },
}

/// Runs one command. Failures reported by the service are printed as JSON
/// error bodies on stderr and turn into a non-zero exit code.
pub async fn run(command: Command, config: Config) -> anyhow::Result<ExitCode> {
    let service = UploadService::new(&config.storage)?;

    let outcome = match command {
        Command::Check { file_hash } => {
            render(service.check(&CheckRequest { file_hash }).await)?
        }
        Command::Put {
            file_hash,
            chunk_index,
            file,
        } => {
            let data = tokio::fs::read(&file).await?;
            service
                .upload_chunk(&UploadChunkRequest {
                    file_hash,
                    chunk_index,
                    data,
                })
                .await
                .map(|()| None)
        }
        Command::Merge {
            file_name,
            file_hash,
            file_size,
            chunk_size,
        } => render(
            service
                .merge(&MergeRequest {
                    file_name,
                    file_hash,
                    file_size,
                    chunk_size,
                })
                .await,
        )?,
        Command::Upload {
            file,
            chunk_size,
            name,
        } => render(upload_file(&service, &file, chunk_size, name).await?)?,
    };

    match outcome {
        Ok(Some(json)) => {
            println!("{json}");
            Ok(ExitCode::SUCCESS)
        }
        Ok(None) => Ok(ExitCode::SUCCESS),
        Err(body) => {
            tracing::warn!(code = ?body.code, status = body.status(), "{}", body.message);
            eprintln!("{}", serde_json::to_string(&body)?);
            Ok(exit_code_for(&body))
        }
    }
}

/// Uploads `path` chunk by chunk, skipping indices the store already holds,
/// and merges the result.
///
/// The file's SHA-256 is the upload identifier, so an interrupted upload of
/// the same file resumes where it stopped.
pub async fn upload_file(
    service: &UploadService,
    path: &Path,
    chunk_size: usize,
    name: Option<String>,
) -> anyhow::Result<Result<MergeResponse, ErrorBody>> {
    let file_name = match name {
        Some(n) => n,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow::anyhow!("no file name in {}", path.display()))?,
    };

    let owned = path.to_path_buf();
    let file_hash = tokio::task::spawn_blocking(move || calculate_file_checksum(&owned)).await??;

    let present = match service
        .check(&CheckRequest {
            file_hash: file_hash.clone(),
        })
        .await
    {
        Ok(resp) => resp.chunks,
        Err(body) => return Ok(Err(body)),
    };

    let mut reader = ChunkReader::new(path, chunk_size)?;
    tracing::info!(
        file_hash = %file_hash,
        file_size = reader.file_size(),
        total_chunks = reader.total_chunks(),
        already_stored = present.len(),
        "uploading file"
    );

    loop {
        let index = reader.next_index();
        if present.binary_search(&index).is_ok() {
            if !tokio::task::block_in_place(|| reader.skip_chunk())? {
                break;
            }
            continue;
        }
        let Some(chunk) = tokio::task::block_in_place(|| reader.next_chunk())? else {
            break;
        };
        let req = UploadChunkRequest {
            file_hash: file_hash.clone(),
            chunk_index: chunk.index,
            data: chunk.data,
        };
        if let Err(body) = service.upload_chunk(&req).await {
            return Ok(Err(body));
        }
    }

    let merge = MergeRequest {
        file_name,
        file_hash,
        file_size: i64::try_from(reader.file_size())?,
        chunk_size: i64::try_from(reader.chunk_size())?,
    };
    Ok(service.merge(&merge).await)
}

/// Serializes a successful response; service errors pass through untouched.
fn render<T: Serialize>(
    outcome: Result<T, ErrorBody>,
) -> serde_json::Result<Result<Option<String>, ErrorBody>> {
    match outcome {
        Ok(value) => Ok(Ok(Some(serde_json::to_string(&value)?))),
        Err(body) => Ok(Err(body)),
    }
}

fn exit_code_for(body: &ErrorBody) -> ExitCode {
    match body.code {
        ErrorCode::StorageError | ErrorCode::EmptyResult => ExitCode::from(2),
        _ => ExitCode::from(1),
    }
}

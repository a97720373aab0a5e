use clap::Args;
use serde::Serialize;

use dockhand::context::resolve_target_session;
use dockhand::transfer::{self, TransferManifest, UploadReport};
use dockhand::Error;

use super::CmdResult;

#[derive(Args)]
pub struct SyncArgs {
    /// Target ID
    pub target_id: String,

    /// Skip post-transfer checksum verification
    #[arg(long)]
    pub no_verify: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutput {
    pub command: String,
    pub target_id: String,
    pub report: UploadReport,
}

pub fn run(args: SyncArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<SyncOutput> {
    let ctx = resolve_target_session(&args.target_id)?;

    if ctx.target.manifest.is_empty() {
        ctx.client.close();
        return Err(Error::validation_invalid_argument(
            "manifest",
            "No manifest entries configured for target",
            Some(args.target_id),
            None,
        )
        .with_hint("Add a manifest to the target spec: {\"manifest\": [{\"local\": \"dist\", \"remote\": \"/srv/app\"}]}"));
    }

    let manifest = TransferManifest::from_entries(&ctx.target.manifest);
    let result = transfer::upload(&ctx.client, &manifest, !args.no_verify);
    ctx.client.close();

    let report = result?;
    let exit_code = if report.ok() { 0 } else { 1 };

    Ok((
        SyncOutput {
            command: "sync.run".to_string(),
            target_id: args.target_id,
            report,
        },
        exit_code,
    ))
}

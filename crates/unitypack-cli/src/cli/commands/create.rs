use super::super::args::CreateArgs;
use super::{finish, stderr_sink};
use crate::exit_codes;
use anyhow::Context;
use std::path::Path;
use unitypack_core::{PackageRequest, Packager};

pub async fn run(args: CreateArgs) -> anyhow::Result<i32> {
    let mut meta_files = args.meta_files.clone();
    if let Some(list) = &args.list {
        meta_files.extend(read_meta_list(list)?);
    }
    if meta_files.is_empty() {
        eprintln!("error: no meta files given (pass paths or --list)");
        return Ok(exit_codes::INPUT_ERROR);
    }

    let packager = Packager::new(args.pack.to_config());
    tracing::debug!(config = ?packager.config(), count = meta_files.len(), "create");
    let mut request = PackageRequest::new(meta_files, &args.project_root, &args.output)
        .with_remove_dirs(&args.remove_dirs);
    request.log = stderr_sink(args.pack.verbose);

    Ok(finish(packager.create_package(request).await))
}

/// One meta path per line; blank lines and `#` comments are skipped.
fn read_meta_list(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read meta list: {}", path.display()))?;
    Ok(parse_meta_list(&text))
}

fn parse_meta_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

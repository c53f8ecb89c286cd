use super::super::args::PackFolderArgs;
use super::{finish, stderr_sink};
use unitypack_core::Packager;

pub async fn run(args: PackFolderArgs) -> anyhow::Result<i32> {
    let packager = Packager::new(args.pack.to_config());
    let result = packager
        .pack_staged_folder(
            &args.folder,
            &args.output,
            &args.remove_dirs,
            stderr_sink(args.pack.verbose),
        )
        .await;
    Ok(finish(result))
}

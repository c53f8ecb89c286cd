use super::super::args::InspectArgs;
use super::exit_code_for;
use crate::exit_codes;
use anyhow::Context;
use unitypack_core::{read_package_index, PackageEntry};

pub fn run(args: InspectArgs) -> anyhow::Result<i32> {
    let file = std::fs::File::open(&args.package)
        .with_context(|| format!("failed to open package: {}", args.package.display()))?;
    let entries = match read_package_index(std::io::BufReader::new(file)) {
        Ok(entries) => entries,
        Err(err) => {
            eprintln!("error: {}", err);
            return Ok(exit_code_for(&err));
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print!("{}", render_table(&entries));
        eprintln!("{} assets in {}", entries.len(), args.package.display());
    }
    Ok(exit_codes::SUCCESS)
}

fn render_table(entries: &[PackageEntry]) -> String {
    let mut out = String::new();
    for e in entries {
        let payload = match e.payload_bytes {
            Some(n) => format!("{} B", n),
            None => "-".to_string(),
        };
        out.push_str(&format!(
            "{}  {:>10}  {}{}\n",
            e.guid,
            payload,
            e.pathname.as_deref().unwrap_or("<no pathname>"),
            if e.has_meta { "" } else { "  (no asset.meta)" }
        ));
    }
    out
}

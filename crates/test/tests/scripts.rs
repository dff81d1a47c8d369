use std::path::Path;

use libtest_mimic::{Arguments, Failed, Trial};

use glimpse_test::{collect_scripts, run_script};

fn main() {
    let args = Arguments::from_args();
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("scripts");

    let trials = match collect_scripts(&dir) {
        Ok(scripts) => scripts
            .into_iter()
            .map(|path| {
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                Trial::test(name, move || run_script(&path).map_err(|e| Failed::from(format!("{:#}", e))))
            })
            .collect(),
        Err(e) => vec![Trial::test("collect_scripts", move || Err(Failed::from(format!("{:#}", e))))],
    };

    libtest_mimic::run(&args, trials).exit();
}

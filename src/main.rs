use std::{env, path::PathBuf};

use anyhow::{Context, bail};
use log::info;

use models::{Device, StateDict, StateValue, StoredState, storage};

const DEVICE_VAR: &str = "MODELS_DEVICE";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = env::args_os().skip(1);
    let (Some(path), None) = (args.next(), args.next()) else {
        bail!("usage: models <path>");
    };
    let path = PathBuf::from(path);

    let device = match env::var(DEVICE_VAR) {
        Ok(s) => s
            .parse::<Device>()
            .with_context(|| format!("invalid {DEVICE_VAR}"))?,
        Err(_) => Device::Cpu,
    };

    let stored = storage::read_state(&path, device)
        .with_context(|| format!("failed to read {}", path.display()))?;
    info!("loaded {} entries onto {device}", stored.state.len());

    for line in describe(&stored) {
        println!("{line}");
    }

    Ok(())
}

/// One line for the stored kind, then one per entry, nested entries named by their key path.
fn describe(stored: &StoredState) -> Vec<String> {
    let mut lines = vec![format!("kind: {}", stored.kind.as_deref().unwrap_or("-"))];
    describe_dict("", &stored.state, &mut lines);
    lines
}

fn describe_dict(prefix: &str, dict: &StateDict, lines: &mut Vec<String>) {
    for (key, value) in dict {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}/{key}")
        };
        describe_value(name, value, lines);
    }
}

fn describe_value(name: String, value: &StateValue, lines: &mut Vec<String>) {
    match value {
        StateValue::Float(x) => lines.push(format!("{name}: float {x}")),
        StateValue::Int(x) => lines.push(format!("{name}: int {x}")),
        StateValue::Bool(x) => lines.push(format!("{name}: bool {x}")),
        StateValue::Text(x) => lines.push(format!("{name}: text {x:?}")),
        StateValue::Tensor(t) => lines.push(format!(
            "{name}: {} tensor {:?} on {}",
            t.dtype(),
            t.shape(),
            t.device()
        )),
        StateValue::List(values) => {
            lines.push(format!("{name}: list of {}", values.len()));
            for (i, value) in values.iter().enumerate() {
                describe_value(format!("{name}/{i}"), value, lines);
            }
        }
        StateValue::Dict(dict) => {
            lines.push(format!("{name}: dict of {}", dict.len()));
            describe_dict(&name, dict, lines);
        }
    }
}

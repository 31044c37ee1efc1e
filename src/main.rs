use std::path::Path;

use manipulator_surrogate::run;

const SIMULATION_CONFIG: &str = "config/manipulatorConfig/config.toml";
const MODEL_CONFIG: &str = "config/manipulatorConfig/deeponet.toml";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let outcome = run(Path::new(SIMULATION_CONFIG), Path::new(MODEL_CONFIG))?;
    println!(
        "trained {} ({} parameters), relative L2 test error {:.4}, best parameters at {}",
        outcome.model_type,
        outcome.parameters,
        outcome.test_rel_l2,
        outcome.snapshot.display()
    );

    Ok(())
}

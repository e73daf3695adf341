use anyhow::{bail, Context};
use clap::{Arg, ArgAction, Command};
use compiler::compile;

use std::{fs, io::Read};

fn main() -> anyhow::Result<()> {
    let args = Command::new("math bytecode compiler")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("input")
                .value_name("FILE")
                .default_value("-")
                .help("Source file ('-' for standard input)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Print the lowering, live ranges and final bytecode"),
        )
        .arg(
            Arg::new("call")
                .long("call")
                .value_name("VALUES")
                .value_delimiter(',')
                .value_parser(clap::value_parser!(f64))
                .help("Evaluate with one value per input slot, printing every output slot"),
        )
        .get_matches();

    let path = args.get_one::<String>("input").expect("FILE has a default");
    let source = match path.as_str() {
        "-" => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read standard input")?;
            text
        }

        path => fs::read_to_string(path)
            .with_context(|| format!("Failed to read source file: {}", path))?,
    };

    let function = compile(&source, args.get_flag("verbose"))
        .map_err(|error| anyhow::anyhow!("Compilation failed: {}", error))?;

    if let Some(values) = args.get_many::<f64>("call") {
        let values: Vec<f64> = values.copied().collect();
        if values.len() != function.input_registers().len() {
            bail!(
                "expected {} input values, got {}",
                function.input_registers().len(),
                values.len()
            );
        }

        let mut registers = vec![0.0f64; function.register_count()];
        for (value, &register) in values.iter().zip(function.input_registers()) {
            if register >= 0 {
                registers[register as usize] = *value;
            }
        }

        function.executable().execute(&mut registers);

        for (slot, &register) in function.output_registers().iter().enumerate() {
            println!("output {} = {}", slot, registers[register as usize]);
        }
    } else {
        for (position, instruction) in function.instructions().iter().enumerate() {
            println!("{}: {}", position, instruction);
        }

        println!("registers required: {}", function.register_count());
    }

    Ok(())
}

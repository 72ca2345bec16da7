use ferry_shell::run_control_from_env;

fn main() {
    let code = match run_control_from_env() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("ferry: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

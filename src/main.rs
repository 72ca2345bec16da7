use ferry_shell::run_from_env;

fn main() {
    let code = match run_from_env() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("ferry: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

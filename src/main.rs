use uniqish::Args;

fn main() {
    let result = uniqish::get_args().and_then(|args| match args {
        Args::Run(config) => uniqish::run(config),
        Args::Help(help) => {
            eprintln!("{}", help);
            Ok(())
        }
        Args::Version => Ok(()),
    });

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn main() -> std::process::ExitCode {
    restguard_lib::run()
}

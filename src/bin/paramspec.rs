fn main() {
    std::process::exit(paramspec::cli_main());
}

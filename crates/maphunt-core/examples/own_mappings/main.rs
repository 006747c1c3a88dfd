use maphunt_core::proc_maps::ProcMemoryMaps;
use maphunt_core::*;

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .init();

    let pid = nix::unistd::getpid();
    // Render our own mappings like `info proc mappings` would
    let maps = ProcMemoryMaps::from_pid(pid).unwrap();
    let text = maps.render_report();
    print!("{text}");

    // Parse them back into rows
    let report = parse_report(&text).unwrap();
    println!("Parsed {} mappings", report.len());

    // Look up where this function lives
    let address = main as fn() as usize as u64;
    match report.find_containing(address).unwrap() {
        Some(record) => println!("main ({address:#x}) is mapped by {record}"),
        None => println!("main ({address:#x}) is not mapped?"),
    }
}

//! The `profiles` and `shapes` listings. These never fail.

use stress_domain::shapes::LoadShape;
use stress_domain::workload::builtin_profiles;

pub fn profiles() {
    println!();
    for profile in builtin_profiles() {
        println!("  {:<18} {}", profile.name, profile.description);
        let ops: Vec<String> = profile
            .operations
            .iter()
            .map(|m| format!("{}x{}", m.op.method_name(), m.weight))
            .collect();
        println!(
            "  {:<18} shape {}, {}s, concurrency {}, ops: {}",
            "",
            profile.shape,
            profile.duration_secs,
            profile.concurrency,
            ops.join(" ")
        );
    }
    println!();
}

pub fn shapes() {
    println!();
    for shape in LoadShape::all() {
        println!("  {:<14} {}", shape.as_str(), shape.description());
    }
    println!();
}

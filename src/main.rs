fn main() {
    println!("varca-tools - Classifier reporting utilities");
    println!();
    println!("Tools:");
    println!("  varca2vcf      - Classified + prepared site tables → VCF");
    println!("  varca_metrics  - Truth/prediction/probability table → metrics (one per line)");
    println!();
    println!("For help with each tool:");
    println!("  cargo run --bin varca2vcf -- --help");
    println!("  cargo run --bin varca_metrics -- --help");
    println!();
    println!("Quick start:");
    println!("  cargo run --bin varca2vcf -- -o calls.vcf classified.tsv prepared.tsv");
    println!("  cargo run --bin varca_metrics -- -o metrics.txt predictions.tsv");
}

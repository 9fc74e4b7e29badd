//! `tasksmith tools`: list what a plan can call.

use tasksmith_config::AppConfig;
use tasksmith_core::tool::ToolDescriptor;
use crate::bootstrap;

pub async fn list(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let registry = bootstrap::registry(config);
    println!("Registered tools ({})", registry.len());
    println!();
    for descriptor in registry.descriptors() {
        for line in render(descriptor) {
            println!("{line}");
        }
        println!();
    }
    Ok(())
}

fn render(descriptor: &ToolDescriptor) -> Vec<String> {
    let mut lines = vec![
        format!("  {}", descriptor.name),
        format!("    {}", descriptor.description.split_whitespace().collect::<Vec<_>>().join(" ")),
    ];
    for param in &descriptor.params {
        let marker = if param.required { "*" } else { " " };
        lines.push(format!("    {marker} {:<13} {}", param.name, param.description));
    }
    lines.push(format!("    outputs: {}", descriptor.outputs.join(", ")));
    lines
}

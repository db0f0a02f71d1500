//! List the providers filling each pipeline slot.

use console::style;
use serde::Serialize;

use crate::config::Config;
use crate::providers::{create_provider, ProviderMetadata, ProviderSpec};

#[derive(Debug, Serialize)]
struct SlotInfo {
    slot: &'static str,
    name: String,
    metadata: ProviderMetadata,
}

pub fn cmd_providers(config: &Config, json: bool) -> anyhow::Result<()> {
    let slots = slot_info(config);

    if json {
        println!("{}", serde_json::to_string_pretty(&slots)?);
        return Ok(());
    }

    println!("{}", style("Configured providers:").bold());
    for slot in &slots {
        println!(
            "  {:<12} {}",
            style(slot.slot).cyan(),
            style(&slot.name).bold()
        );
        println!(
            "  {:<12} {} / max {} tokens{}",
            "",
            slot.metadata.provider,
            slot.metadata.max_tokens,
            if slot.metadata.supports_context {
                ", accepts instructions"
            } else {
                ""
            }
        );
    }

    println!(
        "\n{} {} ({})",
        style("JSON extraction:").bold(),
        config.llm.model,
        config.llm.provider.as_str()
    );

    Ok(())
}

fn slot_info(config: &Config) -> Vec<SlotInfo> {
    let providers = &config.providers;
    let mut slots: Vec<(&'static str, &ProviderSpec)> = vec![
        ("primary", &providers.primary),
        ("secondary", &providers.secondary),
        ("adjudicator", providers.adjudicator_spec()),
    ];
    if providers.fallback_enabled {
        slots.push(("fallback", providers.fallback_spec()));
    }

    slots
        .into_iter()
        .map(|(slot, spec)| {
            let provider = create_provider(spec);
            SlotInfo {
                slot,
                name: provider.name(),
                metadata: provider.metadata(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_follow_config() {
        let mut config = Config::default();
        let slots = slot_info(&config);
        let names: Vec<_> = slots.iter().map(|s| s.slot).collect();
        assert_eq!(names, ["primary", "secondary", "adjudicator", "fallback"]);

        config.providers.fallback_enabled = false;
        assert_eq!(slot_info(&config).len(), 3);
    }
}

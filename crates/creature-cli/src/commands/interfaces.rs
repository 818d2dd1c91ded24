//! `creature interfaces`: list host interfaces usable for sACN.

use tabled::Tabled;

use creature_config::Config;
use creature_net::{InterfaceCatalog, NetworkInterfaceDescriptor, SystemInterfaces};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct InterfaceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "IPv4")]
    addresses: String,
}

impl InterfaceRow {
    fn new(iface: &NetworkInterfaceDescriptor) -> Self {
        let addresses = if iface.addresses.is_empty() {
            "-".to_owned()
        } else {
            iface
                .addresses
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        Self {
            name: iface.name.clone(),
            kind: iface.kind.to_string(),
            addresses,
        }
    }
}

pub fn handle(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let interfaces = SystemInterfaces.list_interfaces();
    tracing::debug!(count = interfaces.len(), "enumerated interfaces");

    let rendered = output::render_list(output::format(global, cfg), &interfaces, InterfaceRow::new)?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

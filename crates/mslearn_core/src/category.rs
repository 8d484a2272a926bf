use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Technical category assigned to a training record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Active_Directory")]
    ActiveDirectory,
    #[serde(rename = "DNS_Administration")]
    DnsAdministration,
    #[serde(rename = "DHCP")]
    Dhcp,
    PowerShell,
    Security,
    Networking,
    Administration,
    Deployment,
    Troubleshooting,
    Uncategorized,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::ActiveDirectory,
        Category::DnsAdministration,
        Category::Dhcp,
        Category::PowerShell,
        Category::Security,
        Category::Networking,
        Category::Administration,
        Category::Deployment,
        Category::Troubleshooting,
        Category::Uncategorized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ActiveDirectory => "Active_Directory",
            Category::DnsAdministration => "DNS_Administration",
            Category::Dhcp => "DHCP",
            Category::PowerShell => "PowerShell",
            Category::Security => "Security",
            Category::Networking => "Networking",
            Category::Administration => "Administration",
            Category::Deployment => "Deployment",
            Category::Troubleshooting => "Troubleshooting",
            Category::Uncategorized => "Uncategorized",
        }
    }

    /// Short human description, shown next to category counts.
    pub fn description(&self) -> &'static str {
        match self {
            Category::ActiveDirectory => "Active Directory administration and management",
            Category::DnsAdministration => "Domain Name System configuration and troubleshooting",
            Category::Dhcp => "Dynamic Host Configuration Protocol management",
            Category::PowerShell => "PowerShell scripting and automation",
            Category::Security => "Windows Server security and authentication",
            Category::Networking => "Network configuration and management",
            Category::Administration => "Windows Server administration",
            Category::Deployment => "Deployment, installation and configuration",
            Category::Troubleshooting => "Diagnostics and troubleshooting",
            Category::Uncategorized => "General purpose training data",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown category {wanted:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::Category;

    #[test]
    fn names_round_trip_through_from_str() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
        assert_eq!("dns_administration".parse(), Ok(Category::DnsAdministration));
        assert!("Storage".parse::<Category>().is_err());
    }

    #[test]
    fn serde_uses_display_names() {
        let json = serde_json::to_string(&Category::ActiveDirectory).unwrap();
        assert_eq!(json, "\"Active_Directory\"");
    }
}

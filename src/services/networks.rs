use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::Arc;

use crate::db::{ClientRepository, NetworkRepository, NetworkRow, ProjectRepository, Store};
use crate::entities::networks;
use crate::services::audit::{Actor, AuditAction, AuditEntry, AuditRecorder};
use crate::services::clients::non_blank;
use crate::services::error::{FieldErrors, ServiceError};

pub const ENTITY: &str = "network";

pub const VLAN_MIN: i32 = 1;
pub const VLAN_MAX: i32 = 4094;

/// An address block. Host bits are cleared on parse, so `10.0.0.7/24` and
/// `10.0.0.0/24` are the same network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    #[must_use]
    pub const fn prefix(&self) -> u8 {
        self.prefix
    }

    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => mask_v4(ip, self.prefix) == net,
            (IpAddr::V6(net), IpAddr::V6(ip)) => mask_v6(ip, self.prefix) == net,
            _ => false,
        }
    }
}

fn mask_v4(ip: Ipv4Addr, prefix: u8) -> Ipv4Addr {
    let bits = u32::from(ip);
    let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
    Ipv4Addr::from(bits & mask)
}

fn mask_v6(ip: Ipv6Addr, prefix: u8) -> Ipv6Addr {
    let bits = u128::from(ip);
    let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
    Ipv6Addr::from(bits & mask)
}

impl FromStr for Cidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| "must be in address/prefix form".to_string())?;

        let addr: IpAddr = addr
            .parse()
            .map_err(|_| format!("'{addr}' is not an IP address"))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| format!("'{prefix}' is not a prefix length"))?;

        let network = match addr {
            IpAddr::V4(v4) if prefix <= 32 => IpAddr::V4(mask_v4(v4, prefix)),
            IpAddr::V6(v6) if prefix <= 128 => IpAddr::V6(mask_v6(v6, prefix)),
            _ => return Err(format!("prefix /{prefix} is out of range")),
        };

        Ok(Self { network, prefix })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkView {
    pub id: i32,
    pub client_id: i32,
    pub project_id: Option<i32>,
    pub cidr: String,
    pub vlan_id: Option<i32>,
    pub gateway: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&networks::Model> for NetworkView {
    fn from(model: &networks::Model) -> Self {
        Self {
            id: model.id,
            client_id: model.client_id,
            project_id: model.project_id,
            cidr: model.cidr.clone(),
            vlan_id: model.vlan_id,
            gateway: model.gateway.clone(),
            description: model.description.clone(),
            created_at: model.created_at.clone(),
            updated_at: model.updated_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkInput {
    pub client_id: i32,
    #[serde(default)]
    pub project_id: Option<i32>,
    pub cidr: String,
    #[serde(default)]
    pub vlan_id: Option<i32>,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NetworkInput {
    /// Shape checks that need no database access.
    #[must_use]
    pub fn check(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();

        let cidr = match self.cidr.parse::<Cidr>() {
            Ok(cidr) => Some(cidr),
            Err(e) => {
                errors.insert("cidr".to_string(), e);
                None
            }
        };

        if let Some(vlan) = self.vlan_id
            && !(VLAN_MIN..=VLAN_MAX).contains(&vlan)
        {
            errors.insert(
                "vlan_id".to_string(),
                format!("must be between {VLAN_MIN} and {VLAN_MAX}"),
            );
        }

        if let Some(gateway) = non_blank(self.gateway.as_deref()) {
            match gateway.parse::<IpAddr>() {
                Ok(ip) => {
                    if let Some(cidr) = cidr
                        && !cidr.contains(ip)
                    {
                        errors.insert("gateway".to_string(), format!("must be inside {cidr}"));
                    }
                }
                Err(_) => {
                    errors.insert("gateway".to_string(), "must be an IP address".to_string());
                }
            }
        }

        errors
    }

    fn to_row(&self) -> Result<NetworkRow, ServiceError> {
        let errors = self.check();
        if !errors.is_empty() {
            return Err(ServiceError::Validation(errors));
        }

        let cidr = self
            .cidr
            .parse::<Cidr>()
            .map_err(|e| ServiceError::invalid("cidr", e))?;
        let gateway = non_blank(self.gateway.as_deref())
            .map(|g| g.parse::<IpAddr>().map(|ip| ip.to_string()))
            .transpose()
            .map_err(|_| ServiceError::invalid("gateway", "must be an IP address"))?;

        Ok(NetworkRow {
            client_id: self.client_id,
            project_id: self.project_id,
            cidr: cidr.to_string(),
            vlan_id: self.vlan_id,
            gateway,
            description: non_blank(self.description.as_deref()).map(str::to_string),
        })
    }
}

pub struct NetworkService {
    store: Store,
    audit: Arc<AuditRecorder>,
}

impl NetworkService {
    #[must_use]
    pub const fn new(store: Store, audit: Arc<AuditRecorder>) -> Self {
        Self { store, audit }
    }

    pub async fn list(&self, client_id: Option<i32>) -> Result<Vec<NetworkView>, ServiceError> {
        let networks = self.store.networks().list(client_id).await?;
        Ok(networks.iter().map(NetworkView::from).collect())
    }

    pub async fn get(&self, id: i32) -> Result<NetworkView, ServiceError> {
        self.store
            .networks()
            .get(id)
            .await?
            .map(|m| NetworkView::from(&m))
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))
    }

    /// Client must exist; a project, when given, must belong to that client.
    async fn check_references<C: sea_orm::ConnectionTrait>(
        db: &C,
        row: &NetworkRow,
    ) -> Result<(), ServiceError> {
        if ClientRepository::find_in(db, row.client_id).await?.is_none() {
            return Err(ServiceError::invalid("client_id", "client does not exist"));
        }
        if let Some(project_id) = row.project_id {
            match ProjectRepository::find_in(db, project_id).await? {
                Some(project) if project.client_id == row.client_id => {}
                Some(_) => {
                    return Err(ServiceError::invalid(
                        "project_id",
                        "project belongs to a different client",
                    ));
                }
                None => {
                    return Err(ServiceError::invalid("project_id", "project does not exist"));
                }
            }
        }
        Ok(())
    }

    pub async fn create(
        &self,
        actor: &Actor,
        input: &NetworkInput,
    ) -> Result<NetworkView, ServiceError> {
        let row = input.to_row()?;

        let txn = self.store.begin().await?;
        Self::check_references(&txn, &row).await?;

        let model = NetworkRepository::insert(&txn, row).await?;
        let view = NetworkView::from(&model);

        let entry =
            AuditEntry::new(actor, AuditAction::Create, ENTITY, model.id).with_new(&view)?;
        self.audit.commit(txn, vec![entry]).await?;

        Ok(view)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: i32,
        input: &NetworkInput,
    ) -> Result<NetworkView, ServiceError> {
        let row = input.to_row()?;

        let txn = self.store.begin().await?;
        let existing = NetworkRepository::find_in(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;
        Self::check_references(&txn, &row).await?;

        let before = NetworkView::from(&existing);
        let model = NetworkRepository::update(&txn, existing, row).await?;
        let after = NetworkView::from(&model);

        let entry = AuditEntry::new(actor, AuditAction::Update, ENTITY, id)
            .with_old(&before)?
            .with_new(&after)?;
        self.audit.commit(txn, vec![entry]).await?;

        Ok(after)
    }

    pub async fn delete(&self, actor: &Actor, id: i32) -> Result<(), ServiceError> {
        let txn = self.store.begin().await?;
        let existing = NetworkRepository::find_in(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;

        NetworkRepository::delete(&txn, id).await?;

        let entry = AuditEntry::new(actor, AuditAction::Delete, ENTITY, id)
            .with_old(&NetworkView::from(&existing))?;
        self.audit.commit(txn, vec![entry]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(cidr: &str) -> NetworkInput {
        NetworkInput {
            client_id: 1,
            cidr: cidr.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_cidr_parsing_clears_host_bits() {
        let cidr: Cidr = "10.20.30.40/16".parse().unwrap();
        assert_eq!(cidr.to_string(), "10.20.0.0/16");
        assert_eq!(cidr.prefix(), 16);

        let v6: Cidr = "2001:db8::1/32".parse().unwrap();
        assert_eq!(v6.to_string(), "2001:db8::/32");

        assert_eq!("0.0.0.0/0".parse::<Cidr>().unwrap().to_string(), "0.0.0.0/0");
        assert_eq!(
            "192.168.1.1/32".parse::<Cidr>().unwrap().to_string(),
            "192.168.1.1/32"
        );
    }

    #[test]
    fn test_cidr_rejects_malformed() {
        assert!("10.0.0.0".parse::<Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Cidr>().is_err());
        assert!("10.0.0/24".parse::<Cidr>().is_err());
        assert!("::/129".parse::<Cidr>().is_err());
        assert!("10.0.0.0/abc".parse::<Cidr>().is_err());
    }

    #[test]
    fn test_contains() {
        let cidr: Cidr = "10.0.0.0/24".parse().unwrap();
        assert!(cidr.contains("10.0.0.1".parse().unwrap()));
        assert!(!cidr.contains("10.0.1.1".parse().unwrap()));
        assert!(!cidr.contains("::1".parse().unwrap()));
    }

    #[test]
    fn test_check_collects_field_errors() {
        let mut bad = input("nope");
        bad.vlan_id = Some(4095);
        bad.gateway = Some("also-nope".to_string());
        let errors = bad.check();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains_key("cidr"));
        assert!(errors.contains_key("vlan_id"));
        assert!(errors.contains_key("gateway"));
    }

    #[test]
    fn test_gateway_must_be_inside_network() {
        let mut outside = input("10.0.0.0/24");
        outside.gateway = Some("10.0.1.1".to_string());
        assert!(outside.check().contains_key("gateway"));

        let mut inside = input("10.0.0.0/24");
        inside.gateway = Some("10.0.0.1".to_string());
        inside.vlan_id = Some(VLAN_MAX);
        assert!(inside.check().is_empty());
    }
}

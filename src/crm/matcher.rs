use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};
use tracing::debug;

use crate::db::DbActorHandle;
use crate::error::SyncError;

/// Resolution of one email address against stored CRM records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrmMatch {
    Contact { id: i64, account_id: Option<i64> },
    Lead { id: i64 },
    None,
}

impl CrmMatch {
    pub fn is_match(&self) -> bool {
        !matches!(self, CrmMatch::None)
    }

    pub fn contact_id(&self) -> Option<i64> {
        match self {
            CrmMatch::Contact { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn lead_id(&self) -> Option<i64> {
        match self {
            CrmMatch::Lead { id } => Some(*id),
            _ => None,
        }
    }

    pub fn account_id(&self) -> Option<i64> {
        match self {
            CrmMatch::Contact { account_id, .. } => *account_id,
            _ => None,
        }
    }
}

/// `{"type": "Contact", "id": 1, "accountId": 7}`, `{"type": "Lead", "id": 3}`
/// or `{"type": null, "id": null}`.
impl Serialize for CrmMatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CrmMatch::Contact { id, account_id } => {
                let mut s = serializer.serialize_struct("CrmMatch", 3)?;
                s.serialize_field("type", "Contact")?;
                s.serialize_field("id", id)?;
                if let Some(account_id) = account_id {
                    s.serialize_field("accountId", account_id)?;
                } else {
                    s.skip_field("accountId")?;
                }
                s.end()
            }
            CrmMatch::Lead { id } => {
                let mut s = serializer.serialize_struct("CrmMatch", 2)?;
                s.serialize_field("type", "Lead")?;
                s.serialize_field("id", id)?;
                s.end()
            }
            CrmMatch::None => {
                let mut s = serializer.serialize_struct("CrmMatch", 2)?;
                s.serialize_field("type", &Option::<&str>::None)?;
                s.serialize_field("id", &Option::<i64>::None)?;
                s.end()
            }
        }
    }
}

/// Exact, case-sensitive lookup: contacts first, then leads.
#[derive(Clone)]
pub struct CrmMatcher {
    db: DbActorHandle,
}

impl CrmMatcher {
    pub fn new(db: DbActorHandle) -> Self {
        Self { db }
    }

    pub async fn match_email_to_crm(&self, address: &str) -> Result<CrmMatch, SyncError> {
        if address.is_empty() {
            return Ok(CrmMatch::None);
        }

        if let Some(contact) = self.db.find_contact_by_email(address).await? {
            return Ok(CrmMatch::Contact {
                id: contact.id,
                account_id: contact.account_id,
            });
        }

        if let Some(lead) = self.db.find_lead_by_email(address).await? {
            return Ok(CrmMatch::Lead { id: lead.id });
        }

        debug!(address, "no CRM record for address");
        Ok(CrmMatch::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_to_tagged_shape() {
        let contact = CrmMatch::Contact {
            id: 4,
            account_id: Some(9),
        };
        assert_eq!(
            serde_json::to_value(contact).unwrap(),
            json!({"type": "Contact", "id": 4, "accountId": 9})
        );
        assert_eq!(
            serde_json::to_value(CrmMatch::Lead { id: 2 }).unwrap(),
            json!({"type": "Lead", "id": 2})
        );
        assert_eq!(
            serde_json::to_value(CrmMatch::None).unwrap(),
            json!({"type": null, "id": null})
        );
    }
}

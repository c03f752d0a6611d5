//! Tagged describe-instance rows.
//!
//! A describe response is a flat list of rows. A `RESERVATION` row
//! opens each reservation and is followed by one `INSTANCE` row per
//! instance shaped `[tag, id, image, public_dns, private_dns, ..., state]`.
//! The state is always the last field.

use nimbus_core::{Instance, InstanceState};

pub const RESERVATION_TAG: &str = "RESERVATION";
pub const INSTANCE_TAG: &str = "INSTANCE";

/// One row of a describe response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub fields: Vec<String>,
}

impl RawRecord {
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn reservation(reservation_id: &str, owner_id: &str) -> Self {
        Self::new([RESERVATION_TAG, reservation_id, owner_id])
    }

    pub fn instance(instance: &Instance) -> Self {
        Self::new([
            INSTANCE_TAG,
            instance.id.as_str(),
            instance.image_id.as_str(),
            instance.public_addr.as_str(),
            instance.private_addr.as_str(),
            instance.state.as_str(),
        ])
    }

    pub fn tag(&self) -> &str {
        self.fields.first().map(String::as_str).unwrap_or("")
    }

    /// Convert an `INSTANCE` row into a typed snapshot.
    ///
    /// Returns `None` for reservation headers and truncated rows.
    pub fn to_instance(&self) -> Option<Instance> {
        if self.tag() != INSTANCE_TAG || self.fields.len() < 6 {
            return None;
        }
        let state = self.fields.last()?;
        Some(Instance {
            id: self.fields[1].clone(),
            image_id: self.fields[2].clone(),
            public_addr: self.fields[3].clone(),
            private_addr: self.fields[4].clone(),
            state: InstanceState::parse(state),
        })
    }
}

impl std::fmt::Display for RawRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.fields.join("\t"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_row_parses() {
        let row = RawRecord::new([
            "INSTANCE",
            "i-1",
            "ami-w",
            "ec2-1.amazonaws.com",
            "ip-10-0-0-1.internal",
            "gsg-keypair",
            "running",
        ]);
        let instance = row.to_instance().unwrap();
        assert_eq!(instance.id, "i-1");
        assert_eq!(instance.image_id, "ami-w");
        assert_eq!(instance.public_addr, "ec2-1.amazonaws.com");
        assert_eq!(instance.private_addr, "ip-10-0-0-1.internal");
        assert_eq!(instance.state, InstanceState::Running);
    }

    #[test]
    fn reservation_row_is_skipped() {
        let row = RawRecord::reservation("r-1", "123456");
        assert_eq!(row.tag(), RESERVATION_TAG);
        assert!(row.to_instance().is_none());
    }

    #[test]
    fn truncated_instance_row_is_skipped() {
        let row = RawRecord::new(["INSTANCE", "i-1", "ami-w"]);
        assert!(row.to_instance().is_none());
    }
}

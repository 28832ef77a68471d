//! Checkout form record and its field identifiers.
//!
//! The form is a closed record: text inputs are addressed by [`Field`] and the
//! two checkboxes by [`Toggle`]. Conditional requiredness is a property of the
//! whole record, so it lives here rather than on individual fields.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Text inputs on the checkout form.
///
/// Serialized with the camelCase names the storefront client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    FirstName,
    LastName,
    Email,
    Phone,
    Address,
    City,
    PostalCode,
    ShippingAddress,
    ShippingCity,
    ShippingPostalCode,
    CompanyName,
    CompanyTaxId,
    ShippingMethod,
    Notes,
}

impl Field {
    /// Every field, in form order.
    pub const ALL: [Self; 14] = [
        Self::FirstName,
        Self::LastName,
        Self::Email,
        Self::Phone,
        Self::Address,
        Self::City,
        Self::PostalCode,
        Self::ShippingAddress,
        Self::ShippingCity,
        Self::ShippingPostalCode,
        Self::CompanyName,
        Self::CompanyTaxId,
        Self::ShippingMethod,
        Self::Notes,
    ];

    /// Fields that are required on every checkout.
    pub const ALWAYS_REQUIRED: [Self; 8] = [
        Self::FirstName,
        Self::LastName,
        Self::Email,
        Self::Phone,
        Self::Address,
        Self::City,
        Self::PostalCode,
        Self::ShippingMethod,
    ];

    /// Required when shipping to a different address.
    pub const SHIPPING_ADDRESS: [Self; 3] = [
        Self::ShippingAddress,
        Self::ShippingCity,
        Self::ShippingPostalCode,
    ];

    /// Required when a company invoice is requested.
    pub const COMPANY_INVOICE: [Self; 2] = [Self::CompanyName, Self::CompanyTaxId];

    /// Wire name of the field.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FirstName => "firstName",
            Self::LastName => "lastName",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Address => "address",
            Self::City => "city",
            Self::PostalCode => "postalCode",
            Self::ShippingAddress => "shippingAddress",
            Self::ShippingCity => "shippingCity",
            Self::ShippingPostalCode => "shippingPostalCode",
            Self::CompanyName => "companyName",
            Self::CompanyTaxId => "companyTaxId",
            Self::ShippingMethod => "shippingMethod",
            Self::Notes => "notes",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("unknown form field: {s}"))
    }
}

/// Checkbox inputs on the checkout form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Toggle {
    SameAsBilling,
    NeedsCompanyInvoice,
}

impl Toggle {
    /// Wire name of the toggle.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SameAsBilling => "sameAsBilling",
            Self::NeedsCompanyInvoice => "needsCompanyInvoice",
        }
    }
}

impl std::str::FromStr for Toggle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sameAsBilling" => Ok(Self::SameAsBilling),
            "needsCompanyInvoice" => Ok(Self::NeedsCompanyInvoice),
            _ => Err(format!("unknown form toggle: {s}")),
        }
    }
}

/// The customer-entered checkout form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub same_as_billing: bool,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_postal_code: String,
    pub needs_company_invoice: bool,
    pub company_name: String,
    pub company_tax_id: String,
    pub shipping_method: String,
    pub notes: String,
}

impl Default for FormData {
    fn default() -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            phone: String::new(),
            address: String::new(),
            city: String::new(),
            postal_code: String::new(),
            same_as_billing: true,
            shipping_address: String::new(),
            shipping_city: String::new(),
            shipping_postal_code: String::new(),
            needs_company_invoice: false,
            company_name: String::new(),
            company_tax_id: String::new(),
            shipping_method: crate::receipt::STANDARD_DELIVERY.to_owned(),
            notes: String::new(),
        }
    }
}

impl FormData {
    /// Current value of a text field.
    #[must_use]
    pub fn value(&self, field: Field) -> &str {
        match field {
            Field::FirstName => &self.first_name,
            Field::LastName => &self.last_name,
            Field::Email => &self.email,
            Field::Phone => &self.phone,
            Field::Address => &self.address,
            Field::City => &self.city,
            Field::PostalCode => &self.postal_code,
            Field::ShippingAddress => &self.shipping_address,
            Field::ShippingCity => &self.shipping_city,
            Field::ShippingPostalCode => &self.shipping_postal_code,
            Field::CompanyName => &self.company_name,
            Field::CompanyTaxId => &self.company_tax_id,
            Field::ShippingMethod => &self.shipping_method,
            Field::Notes => &self.notes,
        }
    }

    /// Replace the value of a text field.
    pub fn set_value(&mut self, field: Field, value: impl Into<String>) {
        let slot = match field {
            Field::FirstName => &mut self.first_name,
            Field::LastName => &mut self.last_name,
            Field::Email => &mut self.email,
            Field::Phone => &mut self.phone,
            Field::Address => &mut self.address,
            Field::City => &mut self.city,
            Field::PostalCode => &mut self.postal_code,
            Field::ShippingAddress => &mut self.shipping_address,
            Field::ShippingCity => &mut self.shipping_city,
            Field::ShippingPostalCode => &mut self.shipping_postal_code,
            Field::CompanyName => &mut self.company_name,
            Field::CompanyTaxId => &mut self.company_tax_id,
            Field::ShippingMethod => &mut self.shipping_method,
            Field::Notes => &mut self.notes,
        };
        *slot = value.into();
    }

    /// Current state of a checkbox.
    #[must_use]
    pub const fn toggle(&self, toggle: Toggle) -> bool {
        match toggle {
            Toggle::SameAsBilling => self.same_as_billing,
            Toggle::NeedsCompanyInvoice => self.needs_company_invoice,
        }
    }

    /// Set a checkbox.
    pub const fn set_toggle(&mut self, toggle: Toggle, enabled: bool) {
        match toggle {
            Toggle::SameAsBilling => self.same_as_billing = enabled,
            Toggle::NeedsCompanyInvoice => self.needs_company_invoice = enabled,
        }
    }

    /// Whether `field` must be filled in, given the rest of the form.
    #[must_use]
    pub fn is_required(&self, field: Field) -> bool {
        if Field::SHIPPING_ADDRESS.contains(&field) {
            return !self.same_as_billing;
        }
        if Field::COMPANY_INVOICE.contains(&field) {
            return self.needs_company_invoice;
        }
        Field::ALWAYS_REQUIRED.contains(&field)
    }

    /// The full set of fields that gate submission.
    #[must_use]
    pub fn required_fields(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|field| self.is_required(*field))
            .collect()
    }

    /// Shipping address to deliver to, resolving `sameAsBilling`.
    #[must_use]
    pub fn delivery_address(&self) -> PostalAddress {
        if self.same_as_billing {
            self.billing_address()
        } else {
            PostalAddress {
                street: self.shipping_address.trim().to_owned(),
                city: self.shipping_city.trim().to_owned(),
                postal_code: self.shipping_postal_code.trim().to_owned(),
            }
        }
    }

    /// Billing address.
    #[must_use]
    pub fn billing_address(&self) -> PostalAddress {
        PostalAddress {
            street: self.address.trim().to_owned(),
            city: self.city.trim().to_owned(),
            postal_code: self.postal_code.trim().to_owned(),
        }
    }

    /// Display name of the customer.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

/// A street address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress {
    pub street: String,
    pub city: String,
    pub postal_code: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_roundtrip() {
        for field in Field::ALL {
            assert_eq!(field.as_str().parse::<Field>().unwrap(), field);
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{}\"", field.as_str()));
        }
        assert!("password".parse::<Field>().is_err());
    }

    #[test]
    fn test_default_requires_base_fields_only() {
        let form = FormData::default();
        assert_eq!(form.required_fields(), Field::ALWAYS_REQUIRED.to_vec());
    }

    #[test]
    fn test_separate_shipping_requires_trio() {
        let mut form = FormData::default();
        form.set_toggle(Toggle::SameAsBilling, false);
        for field in Field::SHIPPING_ADDRESS {
            assert!(form.is_required(field));
        }
        assert!(!form.is_required(Field::CompanyName));
    }

    #[test]
    fn test_company_invoice_requires_pair() {
        let mut form = FormData::default();
        form.set_toggle(Toggle::NeedsCompanyInvoice, true);
        assert!(form.is_required(Field::CompanyName));
        assert!(form.is_required(Field::CompanyTaxId));
        assert!(!form.is_required(Field::ShippingCity));
        assert!(!form.is_required(Field::Notes));
    }

    #[test]
    fn test_delivery_address_follows_toggle() {
        let mut form = FormData::default();
        form.set_value(Field::Address, "Ilica 10");
        form.set_value(Field::City, "Zagreb");
        form.set_value(Field::PostalCode, "10000");
        form.set_value(Field::ShippingAddress, "Riva 2");
        form.set_value(Field::ShippingCity, "Split");
        form.set_value(Field::ShippingPostalCode, "21000");

        assert_eq!(form.delivery_address().city, "Zagreb");
        form.set_toggle(Toggle::SameAsBilling, false);
        assert_eq!(form.delivery_address().city, "Split");
    }

    #[test]
    fn test_camel_case_serde() {
        let form = FormData::default();
        let json = serde_json::to_value(&form).unwrap();
        assert_eq!(json["sameAsBilling"], serde_json::Value::Bool(true));
        assert_eq!(json["shippingMethod"], "Standard delivery");
    }
}

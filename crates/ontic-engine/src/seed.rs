//! The starter ontology installed for new tenants.

use ontic_core::{
  Result,
  definition::{
    AttributeDataType, Cardinality, NewAttribute, NewObjectType,
    NewRelationshipType, NewVersion, ObjectTypeDefinition, OntologyVersion,
  },
  ids::{ObjectTypeId, TenantId},
};
use tracing::info;

use crate::store::DefinitionStore;

const SEED_AUTHOR: &str = "system";

fn plain(name: &str, display: &str, data_type: AttributeDataType) -> NewAttribute {
  NewAttribute::new(name, display, data_type)
}

/// Handles to what [`seed_ontology`] created.
#[derive(Debug, Clone)]
pub struct SeededOntology {
  pub version:  OntologyVersion,
  pub asset:    ObjectTypeId,
  pub location: ObjectTypeId,
  pub person:   ObjectTypeId,
}

/// Create, populate and activate `v1.0.0` with assets, locations and people.
pub fn seed_ontology(store: &DefinitionStore, tenant: &TenantId) -> Result<SeededOntology> {
  let version = store.create_version(tenant, NewVersion::new("v1.0.0", SEED_AUTHOR))?;

  let object_type = |name: &str, display: &str, description: &str| {
    let mut input = NewObjectType::new(name, display);
    input.description = Some(description.to_string());
    input.created_by = Some(SEED_AUTHOR.to_string());
    store.create_object_type(tenant, version.id, input)
  };
  let attribute = |owner: &ObjectTypeDefinition, input: NewAttribute| {
    let mut input = input;
    input.created_by = Some(SEED_AUTHOR.to_string());
    store.create_attribute(tenant, version.id, owner.id, input)
  };

  let asset = object_type("asset", "Asset", "A physical or logical asset in the enterprise.")?;
  attribute(&asset, plain("name", "Name", AttributeDataType::String))?;
  let mut status = plain("status", "Status", AttributeDataType::Enum);
  status.enum_values = ["OPERATIONAL", "DEGRADED", "MAINTENANCE", "OFFLINE"]
    .map(String::from)
    .to_vec();
  status.is_required = true;
  attribute(&asset, status)?;
  attribute(&asset, plain("description", "Description", AttributeDataType::String))?;
  attribute(&asset, plain("capacity", "Capacity", AttributeDataType::Integer))?;

  let location = object_type("location", "Location", "A geographic location.")?;
  attribute(&location, plain("name", "Name", AttributeDataType::String))?;
  attribute(&location, plain("address", "Address", AttributeDataType::String))?;
  attribute(&location, plain("coordinates", "Coordinates", AttributeDataType::GeoPoint))?;

  let person = object_type("person", "Person", "An individual actor or employee.")?;
  attribute(&person, plain("first_name", "First Name", AttributeDataType::String))?;
  attribute(&person, plain("last_name", "Last Name", AttributeDataType::String))?;
  attribute(&person, plain("email", "Email", AttributeDataType::String))?;

  let relationship = |name: &str, display: &str, from, to, cardinality| {
    let mut input = NewRelationshipType::new(name, display, from, to, cardinality);
    input.created_by = Some(SEED_AUTHOR.to_string());
    store.create_relationship_type(tenant, version.id, input)
  };
  relationship(
    "asset_at_location",
    "Located At",
    asset.id,
    location.id,
    Cardinality::ManyToOne,
  )?;
  relationship(
    "person_assigned_to_asset",
    "Assigned To",
    person.id,
    asset.id,
    Cardinality::ManyToMany,
  )?;

  let version = store.activate_version(tenant, version.id)?;
  info!(tenant = %tenant, version = %version.id, "ontology seeded and activated");

  Ok(SeededOntology {
    version,
    asset: asset.id,
    location: location.id,
    person: person.id,
  })
}

//! Element and relationship extraction.
//!
//! Lifts a parsed SPF entity map into `ElementRecord`s and
//! `RelationshipRecord`s. Extraction is deterministic (ascending entity id,
//! fixed relationship-kind order) and tolerant: a record that cannot be
//! formed is logged and skipped, never fatal.

use crate::schema::{self, product_class, ProductClass};
use crate::spf::{parse_spf, SpfEntity, SpfValue};
use anyhow::{Context, Result};
use bimgraph_model::{ElementRecord, PropertySets, PropertyValue, RelationshipRecord};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// A parsed IFC file, ready for extraction.
///
/// Holds the entity map for exactly one source file; re-extraction after a
/// file change means re-parsing. No state survives across files.
pub struct IfcModel {
    entities: HashMap<u32, SpfEntity>,
}

impl IfcModel {
    pub fn parse(input: &str) -> Result<Self> {
        let entities = parse_spf(input)?;
        Ok(Self { entities })
    }

    /// Read and parse an `.ifc` file.
    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("cannot parse {}", path.display()))
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    fn sorted_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    // ------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------

    /// Extract every entity in the product mapping table as an element
    /// record, in ascending entity-id order.
    pub fn extract_elements(&self) -> Vec<ElementRecord> {
        let pset_index = self.property_set_index();
        let mut elements = Vec::new();

        for id in self.sorted_ids() {
            let ent = &self.entities[&id];
            let Some(class) = product_class(&ent.keyword) else {
                continue;
            };
            match self.element_record(ent, class, &pset_index) {
                Some(record) => elements.push(record),
                None => {
                    tracing::warn!(
                        entity = ent.id,
                        keyword = %ent.keyword,
                        "element extraction skipped: missing GlobalId"
                    );
                }
            }
        }

        tracing::info!(count = elements.len(), "extracted elements");
        elements
    }

    fn element_record(
        &self,
        ent: &SpfEntity,
        class: &ProductClass,
        pset_index: &HashMap<u32, Vec<u32>>,
    ) -> Option<ElementRecord> {
        let global_id = ent.args.first()?.as_str()?.to_string();

        let tag = class
            .tag_slot
            .and_then(|slot| ent.args.get(slot))
            .and_then(SpfValue::as_str)
            .unwrap_or_default()
            .to_string();

        Some(ElementRecord {
            global_id,
            ifc_class: class.class_name.to_string(),
            name: attr_string(ent, 2),
            description: attr_string(ent, 3),
            object_type: attr_string(ent, 4),
            tag,
            property_sets: self.property_sets_for(ent.id, pset_index),
        })
    }

    // ------------------------------------------------------------------
    // Property sets
    // ------------------------------------------------------------------

    /// Element entity id → property-set entity ids, from
    /// `IFCRELDEFINESBYPROPERTIES` (related objects at 4, relating
    /// definition at 5).
    fn property_set_index(&self) -> HashMap<u32, Vec<u32>> {
        let mut index: HashMap<u32, Vec<u32>> = HashMap::new();

        for ent in self.entities.values() {
            if ent.keyword != schema::REL_DEFINES_BY_PROPERTIES {
                continue;
            }
            let Some(definition) = ent.args.get(5).and_then(SpfValue::as_ref_id) else {
                continue;
            };
            let Some(related) = ent.args.get(4).and_then(SpfValue::as_list) else {
                continue;
            };
            for target in related {
                if let Some(elem_id) = target.as_ref_id() {
                    index.entry(elem_id).or_default().push(definition);
                }
            }
        }

        for sets in index.values_mut() {
            sets.sort_unstable();
        }
        index
    }

    fn property_sets_for(&self, elem_id: u32, index: &HashMap<u32, Vec<u32>>) -> PropertySets {
        let mut sets = PropertySets::new();

        for pset_id in index.get(&elem_id).map(Vec::as_slice).unwrap_or_default() {
            let Some(pset) = self.entities.get(pset_id) else {
                continue;
            };
            // Quantity sets and other definitions are not property sets.
            if pset.keyword != schema::PROPERTY_SET {
                continue;
            }
            let Some(pset_name) = pset.args.get(2).and_then(SpfValue::as_str) else {
                tracing::warn!(entity = pset.id, "property set skipped: unnamed");
                continue;
            };

            let mut values = BTreeMap::new();
            for prop_ref in pset
                .args
                .get(4)
                .and_then(SpfValue::as_list)
                .unwrap_or_default()
            {
                let Some(prop) = prop_ref.as_ref_id().and_then(|id| self.entities.get(&id))
                else {
                    continue;
                };
                if prop.keyword != schema::PROPERTY_SINGLE_VALUE {
                    tracing::debug!(
                        entity = prop.id,
                        keyword = %prop.keyword,
                        "unsupported property structure skipped"
                    );
                    continue;
                }
                let Some(name) = prop.args.first().and_then(SpfValue::as_str) else {
                    continue;
                };
                match prop.args.get(2).and_then(scalar_value) {
                    Some(value) => {
                        values.insert(name.to_string(), value);
                    }
                    None => {
                        tracing::warn!(
                            entity = prop.id,
                            property = name,
                            "property value skipped: not a scalar"
                        );
                    }
                }
            }

            if !values.is_empty() {
                sets.insert(pset_name.to_string(), values);
            }
        }

        sets
    }

    // ------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------

    /// Extract the five relationship kinds, in kind order, ascending entity
    /// id within each kind. Endpoint references resolve to GlobalIds through
    /// the entity map; a record whose single mandatory endpoint cannot be
    /// resolved is dropped with a warning, while unresolvable members of a
    /// multi-endpoint list are dropped individually.
    pub fn extract_relationships(&self) -> Vec<RelationshipRecord> {
        let mut aggregates = Vec::new();
        let mut connects = Vec::new();
        let mut properties = Vec::new();
        let mut contained = Vec::new();
        let mut grouped = Vec::new();

        for id in self.sorted_ids() {
            let ent = &self.entities[&id];
            let (bucket, record) = match ent.keyword.as_str() {
                schema::REL_AGGREGATES => (&mut aggregates, self.aggregates_record(ent)),
                schema::REL_CONNECTS_ELEMENTS => (&mut connects, self.connects_record(ent)),
                schema::REL_DEFINES_BY_PROPERTIES => {
                    (&mut properties, self.has_property_record(ent))
                }
                schema::REL_CONTAINED_IN_SPATIAL_STRUCTURE => {
                    (&mut contained, self.contained_in_record(ent))
                }
                schema::REL_ASSIGNS_TO_GROUP => (&mut grouped, self.assigned_to_record(ent)),
                _ => continue,
            };
            match record {
                Some(record) => bucket.push(record),
                None => {
                    tracing::warn!(
                        entity = ent.id,
                        keyword = %ent.keyword,
                        "relationship extraction skipped: unresolvable record"
                    );
                }
            }
        }

        let mut relationships = aggregates;
        relationships.extend(connects);
        relationships.extend(properties);
        relationships.extend(contained);
        relationships.extend(grouped);

        tracing::info!(count = relationships.len(), "extracted relationships");
        relationships
    }

    /// IFCRELAGGREGATES: RelatingObject at 4, RelatedObjects at 5.
    fn aggregates_record(&self, ent: &SpfEntity) -> Option<RelationshipRecord> {
        Some(RelationshipRecord::Aggregates {
            global_id: ent.args.first()?.as_str()?.to_string(),
            relating: self.resolve_endpoint(ent.args.get(4))?,
            related: self.resolve_endpoint_list(ent.args.get(5)),
        })
    }

    /// IFCRELCONNECTSELEMENTS: ConnectionGeometry at 4, RelatingElement at
    /// 5, RelatedElement at 6.
    fn connects_record(&self, ent: &SpfEntity) -> Option<RelationshipRecord> {
        Some(RelationshipRecord::ConnectsTo {
            global_id: ent.args.first()?.as_str()?.to_string(),
            relating: self.resolve_endpoint(ent.args.get(5))?,
            related: self.resolve_endpoint(ent.args.get(6))?,
        })
    }

    /// IFCRELDEFINESBYPROPERTIES: RelatedObjects at 4,
    /// RelatingPropertyDefinition at 5.
    fn has_property_record(&self, ent: &SpfEntity) -> Option<RelationshipRecord> {
        Some(RelationshipRecord::HasProperty {
            global_id: ent.args.first()?.as_str()?.to_string(),
            related: self.resolve_endpoint_list(ent.args.get(4)),
            relating_definition: self.resolve_endpoint(ent.args.get(5))?,
        })
    }

    /// IFCRELCONTAINEDINSPATIALSTRUCTURE: RelatedElements at 4,
    /// RelatingStructure at 5.
    fn contained_in_record(&self, ent: &SpfEntity) -> Option<RelationshipRecord> {
        Some(RelationshipRecord::ContainedIn {
            global_id: ent.args.first()?.as_str()?.to_string(),
            related: self.resolve_endpoint_list(ent.args.get(4)),
            relating_structure: self.resolve_endpoint(ent.args.get(5))?,
        })
    }

    /// IFCRELASSIGNSTOGROUP: RelatedObjects at 4, RelatedObjectsType at 5,
    /// RelatingGroup at 6.
    fn assigned_to_record(&self, ent: &SpfEntity) -> Option<RelationshipRecord> {
        Some(RelationshipRecord::AssignedTo {
            global_id: ent.args.first()?.as_str()?.to_string(),
            related: self.resolve_endpoint_list(ent.args.get(4)),
            relating_group: self.resolve_endpoint(ent.args.get(6))?,
        })
    }

    /// Follow an instance reference to the target entity's GlobalId.
    fn resolve_endpoint(&self, value: Option<&SpfValue>) -> Option<String> {
        let id = value?.as_ref_id()?;
        let target = self.entities.get(&id)?;
        Some(target.args.first()?.as_str()?.to_string())
    }

    fn resolve_endpoint_list(&self, value: Option<&SpfValue>) -> Vec<String> {
        let Some(items) = value.and_then(SpfValue::as_list) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| {
                let resolved = self.resolve_endpoint(Some(item));
                if resolved.is_none() {
                    tracing::debug!(?item, "relationship endpoint dropped: unresolvable");
                }
                resolved
            })
            .collect()
    }
}

fn attr_string(ent: &SpfEntity, index: usize) -> String {
    ent.args
        .get(index)
        .and_then(SpfValue::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Flatten a property value to a scalar, unwrapping typed shells like
/// `IFCLABEL('x')` down to their payload.
fn scalar_value(value: &SpfValue) -> Option<PropertyValue> {
    match value {
        SpfValue::Str(s) => Some(PropertyValue::Str(s.clone())),
        SpfValue::Int(n) => Some(PropertyValue::Int(*n)),
        SpfValue::Real(r) => Some(PropertyValue::Real(*r)),
        SpfValue::Bool(b) => Some(PropertyValue::Bool(*b)),
        SpfValue::Enum(e) => Some(PropertyValue::Str(e.clone())),
        SpfValue::Typed(_, inner) => inner.first().and_then(scalar_value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A small but structurally honest model: site → building → storey
    /// hierarchy, two walls and a door on the storey, one wall-to-wall
    /// connection, a property set on wall #20, and a group assignment whose
    /// group is not itself a product.
    const SAMPLE: &str = "ISO-10303-21;\n\
        HEADER;\n\
        FILE_SCHEMA(('IFC4'));\n\
        ENDSEC;\n\
        DATA;\n\
        #2=IFCOWNERHISTORY($,$,$,.ADDED.,$,$,$,1700000000);\n\
        #10=IFCSITE('SiteGid_000000000001',#2,'Site',$,$,$,$,'South lot',.ELEMENT.,$,$,$,$,$);\n\
        #11=IFCBUILDING('BldgGid_000000000001',#2,'Office A',$,$,$,$,$,.ELEMENT.,$,$,$);\n\
        #12=IFCBUILDINGSTOREY('StryGid_000000000001',#2,'Level 1',$,$,$,$,$,.ELEMENT.,0.);\n\
        #20=IFCWALLSTANDARDCASE('WallGid_00000000001a',#2,'Wall-1','Exterior wall','Basic Wall',$,$,'W-01',$);\n\
        #21=IFCWALLSTANDARDCASE('WallGid_00000000001b',#2,'Wall-2',$,'Basic Wall',$,$,'W-02',$);\n\
        #22=IFCDOOR('DoorGid_00000000001a',#2,'Door-1',$,$,$,$,'D-01',$,$);\n\
        #23=IFCCARTESIANPOINT((0.,0.,0.));\n\
        #30=IFCRELAGGREGATES('RelAggSite00000001',#2,$,$,#10,(#11));\n\
        #31=IFCRELAGGREGATES('RelAggBldg00000001',#2,$,$,#11,(#12));\n\
        #32=IFCRELCONTAINEDINSPATIALSTRUCTURE('RelCont00000000001',#2,$,$,(#20,#21,#22),#12);\n\
        #33=IFCRELCONNECTSELEMENTS('RelConn00000000001',#2,$,$,$,#20,#21);\n\
        #40=IFCPROPERTYSET('PsetGid_0000000001',#2,'Pset_WallCommon',$,(#41,#42,#43));\n\
        #41=IFCPROPERTYSINGLEVALUE('IsExternal',$,IFCBOOLEAN(.T.),$);\n\
        #42=IFCPROPERTYSINGLEVALUE('FireRating',$,IFCLABEL('F60'),$);\n\
        #43=IFCPROPERTYSINGLEVALUE('Width',$,IFCPOSITIVELENGTHMEASURE(0.3),$);\n\
        #44=IFCRELDEFINESBYPROPERTIES('RelProp00000000001',#2,$,$,(#20),#40);\n\
        #50=IFCGROUP('GrpGid_000000000001',#2,'Zone 1',$,$);\n\
        #51=IFCRELASSIGNSTOGROUP('RelGrp000000000001',#2,$,$,(#20,#22),$,#50);\n\
        ENDSEC;\n\
        END-ISO-10303-21;\n";

    fn model() -> IfcModel {
        IfcModel::parse(SAMPLE).unwrap()
    }

    #[test]
    fn elements_cover_the_product_hierarchy() {
        let elements = model().extract_elements();
        let classes: Vec<&str> = elements.iter().map(|e| e.ifc_class.as_str()).collect();
        assert_eq!(
            classes,
            vec![
                "IfcSite",
                "IfcBuilding",
                "IfcBuildingStorey",
                "IfcWallStandardCase",
                "IfcWallStandardCase",
                "IfcDoor",
            ]
        );
    }

    #[test]
    fn non_products_are_not_extracted() {
        let elements = model().extract_elements();
        assert!(elements.iter().all(|e| e.ifc_class != "IfcCartesianPoint"));
        // IfcGroup is not an IfcProduct
        assert!(elements.iter().all(|e| !e.global_id.starts_with("GrpGid")));
    }

    #[test]
    fn element_attributes_map_by_slot() {
        let elements = model().extract_elements();
        let wall = elements
            .iter()
            .find(|e| e.global_id == "WallGid_00000000001a")
            .unwrap();
        assert_eq!(wall.name, "Wall-1");
        assert_eq!(wall.description, "Exterior wall");
        assert_eq!(wall.object_type, "Basic Wall");
        assert_eq!(wall.tag, "W-01");

        // Spatial elements have no Tag slot; arg 7 is their LongName.
        let site = elements
            .iter()
            .find(|e| e.ifc_class == "IfcSite")
            .unwrap();
        assert_eq!(site.tag, "");
    }

    #[test]
    fn property_sets_flatten_to_scalars() {
        let elements = model().extract_elements();
        let wall = elements
            .iter()
            .find(|e| e.global_id == "WallGid_00000000001a")
            .unwrap();

        let pset = wall.property_sets.get("Pset_WallCommon").unwrap();
        assert_eq!(pset.get("IsExternal"), Some(&PropertyValue::Bool(true)));
        assert_eq!(
            pset.get("FireRating"),
            Some(&PropertyValue::Str("F60".to_string()))
        );
        assert_eq!(pset.get("Width"), Some(&PropertyValue::Real(0.3)));

        // The other wall has no property relationship.
        let other = elements
            .iter()
            .find(|e| e.global_id == "WallGid_00000000001b")
            .unwrap();
        assert!(other.property_sets.is_empty());
    }

    #[test]
    fn relationships_come_out_in_kind_then_id_order() {
        let rels = model().extract_relationships();
        let kinds: Vec<&str> = rels.iter().map(|r| r.edge_type()).collect();
        assert_eq!(
            kinds,
            vec![
                "AGGREGATES",
                "AGGREGATES",
                "CONNECTS_TO",
                "HAS_PROPERTY",
                "CONTAINED_IN",
                "ASSIGNED_TO",
            ]
        );
    }

    #[test]
    fn aggregation_resolves_to_global_ids() {
        let rels = model().extract_relationships();
        let RelationshipRecord::Aggregates {
            global_id,
            relating,
            related,
        } = &rels[0]
        else {
            panic!("expected aggregation first");
        };
        assert_eq!(global_id, "RelAggSite00000001");
        assert_eq!(relating, "SiteGid_000000000001");
        assert_eq!(related, &vec!["BldgGid_000000000001".to_string()]);
    }

    #[test]
    fn connection_honors_the_geometry_offset() {
        let rels = model().extract_relationships();
        let RelationshipRecord::ConnectsTo {
            relating, related, ..
        } = &rels[2]
        else {
            panic!("expected connection third");
        };
        // Arg 4 is ConnectionGeometry ($ here); endpoints sit at 5 and 6.
        assert_eq!(relating, "WallGid_00000000001a");
        assert_eq!(related, "WallGid_00000000001b");
    }

    #[test]
    fn spatial_containment_lists_all_members() {
        let rels = model().extract_relationships();
        let RelationshipRecord::ContainedIn {
            related,
            relating_structure,
            ..
        } = &rels[4]
        else {
            panic!("expected containment fifth");
        };
        assert_eq!(relating_structure, "StryGid_000000000001");
        assert_eq!(related.len(), 3);
    }

    #[test]
    fn group_assignment_skips_the_type_slot() {
        let rels = model().extract_relationships();
        let RelationshipRecord::AssignedTo {
            related,
            relating_group,
            ..
        } = &rels[5]
        else {
            panic!("expected group assignment last");
        };
        // Group endpoint sits at 6; 5 is the RelatedObjectsType tag.
        assert_eq!(relating_group, "GrpGid_000000000001");
        assert_eq!(related.len(), 2);
    }

    #[test]
    fn missing_global_id_skips_the_element() {
        let input = "DATA;\n\
            #1=IFCWALL($,$,'No gid',$,$,$,$,$,$);\n\
            #2=IFCWALL('WallGid_ok000000000',$,'Has gid',$,$,$,$,$,$);\n\
            ENDSEC;";
        let model = IfcModel::parse(input).unwrap();
        let elements = model.extract_elements();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].global_id, "WallGid_ok000000000");
    }

    #[test]
    fn unresolvable_relating_endpoint_drops_the_record() {
        let input = "DATA;\n\
            #1=IFCWALL('WallGid_a0000000000',$,$,$,$,$,$,$,$);\n\
            #2=IFCRELAGGREGATES('RelGid_00000000001',$,$,$,#99,(#1));\n\
            ENDSEC;";
        let model = IfcModel::parse(input).unwrap();
        assert!(model.extract_relationships().is_empty());
    }

    #[test]
    fn unresolvable_list_member_drops_only_that_member() {
        let input = "DATA;\n\
            #1=IFCSITE('SiteGid_a0000000000',$,$,$,$,$,$,$,.ELEMENT.,$,$,$,$,$);\n\
            #2=IFCWALL('WallGid_a0000000000',$,$,$,$,$,$,$,$);\n\
            #3=IFCRELCONTAINEDINSPATIALSTRUCTURE('RelGid_00000000001',$,$,$,(#2,#99),#1);\n\
            ENDSEC;";
        let model = IfcModel::parse(input).unwrap();
        let rels = model.extract_relationships();
        assert_eq!(rels.len(), 1);
        let RelationshipRecord::ContainedIn { related, .. } = &rels[0] else {
            panic!("expected containment");
        };
        assert_eq!(related, &vec!["WallGid_a0000000000".to_string()]);
    }

    #[test]
    fn quantity_definitions_are_not_property_sets() {
        let input = "DATA;\n\
            #1=IFCWALL('WallGid_a0000000000',$,$,$,$,$,$,$,$);\n\
            #2=IFCELEMENTQUANTITY('QtoGid_000000000001',$,'Qto_WallBaseQuantities',$,$,(#3));\n\
            #3=IFCQUANTITYLENGTH('Length',$,$,4.2);\n\
            #4=IFCRELDEFINESBYPROPERTIES('RelGid_00000000001',$,$,$,(#1),#2);\n\
            ENDSEC;";
        let model = IfcModel::parse(input).unwrap();
        let elements = model.extract_elements();
        assert!(elements[0].property_sets.is_empty());
    }
}

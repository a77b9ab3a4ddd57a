//! IFC schema mapping.
//!
//! The extractor works on raw STEP keywords, so the IfcProduct hierarchy is
//! encoded here as a flat table: keyword → canonical class name → where the
//! `Tag` attribute sits for that class. Spatial structure elements carry a
//! `LongName` in the slot building elements use for `Tag`, and `IfcProxy`
//! pushes `Tag` one slot further out, so the position is per class rather
//! than a constant.
//!
//! Keywords missing from this table are not products (geometry, owner
//! history, property resources, …) and are never extracted as elements.

/// One entry of the product mapping table.
#[derive(Debug, Clone, Copy)]
pub struct ProductClass {
    /// STEP keyword as it appears in the file, upper case.
    pub keyword: &'static str,
    /// Canonical IFC class name, used as the element's specific node label.
    pub class_name: &'static str,
    /// Attribute index of `Tag`, for classes that have one.
    pub tag_slot: Option<usize>,
}

const fn tagged(keyword: &'static str, class_name: &'static str) -> ProductClass {
    ProductClass {
        keyword,
        class_name,
        tag_slot: Some(7),
    }
}

const fn untagged(keyword: &'static str, class_name: &'static str) -> ProductClass {
    ProductClass {
        keyword,
        class_name,
        tag_slot: None,
    }
}

/// IfcProduct subtypes the importer extracts.
pub const PRODUCT_CLASSES: &[ProductClass] = &[
    // Spatial structure
    untagged("IFCSITE", "IfcSite"),
    untagged("IFCBUILDING", "IfcBuilding"),
    untagged("IFCBUILDINGSTOREY", "IfcBuildingStorey"),
    untagged("IFCSPACE", "IfcSpace"),
    untagged("IFCSPATIALZONE", "IfcSpatialZone"),
    // Building elements
    tagged("IFCWALL", "IfcWall"),
    tagged("IFCWALLSTANDARDCASE", "IfcWallStandardCase"),
    tagged("IFCWALLELEMENTEDCASE", "IfcWallElementedCase"),
    tagged("IFCSLAB", "IfcSlab"),
    tagged("IFCSLABSTANDARDCASE", "IfcSlabStandardCase"),
    tagged("IFCSLABELEMENTEDCASE", "IfcSlabElementedCase"),
    tagged("IFCROOF", "IfcRoof"),
    tagged("IFCBEAM", "IfcBeam"),
    tagged("IFCBEAMSTANDARDCASE", "IfcBeamStandardCase"),
    tagged("IFCCOLUMN", "IfcColumn"),
    tagged("IFCCOLUMNSTANDARDCASE", "IfcColumnStandardCase"),
    tagged("IFCDOOR", "IfcDoor"),
    tagged("IFCDOORSTANDARDCASE", "IfcDoorStandardCase"),
    tagged("IFCWINDOW", "IfcWindow"),
    tagged("IFCWINDOWSTANDARDCASE", "IfcWindowStandardCase"),
    tagged("IFCSTAIR", "IfcStair"),
    tagged("IFCSTAIRFLIGHT", "IfcStairFlight"),
    tagged("IFCRAMP", "IfcRamp"),
    tagged("IFCRAMPFLIGHT", "IfcRampFlight"),
    tagged("IFCRAILING", "IfcRailing"),
    tagged("IFCCURTAINWALL", "IfcCurtainWall"),
    tagged("IFCPLATE", "IfcPlate"),
    tagged("IFCPLATESTANDARDCASE", "IfcPlateStandardCase"),
    tagged("IFCMEMBER", "IfcMember"),
    tagged("IFCMEMBERSTANDARDCASE", "IfcMemberStandardCase"),
    tagged("IFCFOOTING", "IfcFooting"),
    tagged("IFCPILE", "IfcPile"),
    tagged("IFCCOVERING", "IfcCovering"),
    tagged("IFCCHIMNEY", "IfcChimney"),
    tagged("IFCSHADINGDEVICE", "IfcShadingDevice"),
    tagged("IFCBUILDINGELEMENTPROXY", "IfcBuildingElementProxy"),
    tagged("IFCBUILDINGELEMENTPART", "IfcBuildingElementPart"),
    tagged("IFCOPENINGELEMENT", "IfcOpeningElement"),
    tagged("IFCVIRTUALELEMENT", "IfcVirtualElement"),
    // Reinforcement and fastening
    tagged("IFCREINFORCINGBAR", "IfcReinforcingBar"),
    tagged("IFCREINFORCINGMESH", "IfcReinforcingMesh"),
    tagged("IFCTENDON", "IfcTendon"),
    tagged("IFCTENDONANCHOR", "IfcTendonAnchor"),
    tagged("IFCDISCRETEACCESSORY", "IfcDiscreteAccessory"),
    tagged("IFCFASTENER", "IfcFastener"),
    tagged("IFCMECHANICALFASTENER", "IfcMechanicalFastener"),
    // Furnishing, transport, site
    tagged("IFCFURNISHINGELEMENT", "IfcFurnishingElement"),
    tagged("IFCFURNITURE", "IfcFurniture"),
    tagged("IFCSYSTEMFURNITUREELEMENT", "IfcSystemFurnitureElement"),
    tagged("IFCELEMENTASSEMBLY", "IfcElementAssembly"),
    tagged("IFCTRANSPORTELEMENT", "IfcTransportElement"),
    tagged("IFCGEOGRAPHICELEMENT", "IfcGeographicElement"),
    tagged("IFCCIVILELEMENT", "IfcCivilElement"),
    // Distribution (MEP)
    tagged("IFCDISTRIBUTIONELEMENT", "IfcDistributionElement"),
    tagged("IFCDISTRIBUTIONCONTROLELEMENT", "IfcDistributionControlElement"),
    tagged("IFCDISTRIBUTIONFLOWELEMENT", "IfcDistributionFlowElement"),
    tagged("IFCFLOWSEGMENT", "IfcFlowSegment"),
    tagged("IFCFLOWFITTING", "IfcFlowFitting"),
    tagged("IFCFLOWTERMINAL", "IfcFlowTerminal"),
    tagged("IFCFLOWCONTROLLER", "IfcFlowController"),
    tagged("IFCFLOWMOVINGDEVICE", "IfcFlowMovingDevice"),
    tagged("IFCFLOWSTORAGEDEVICE", "IfcFlowStorageDevice"),
    tagged("IFCFLOWTREATMENTDEVICE", "IfcFlowTreatmentDevice"),
    tagged("IFCENERGYCONVERSIONDEVICE", "IfcEnergyConversionDevice"),
    tagged("IFCPIPESEGMENT", "IfcPipeSegment"),
    tagged("IFCPIPEFITTING", "IfcPipeFitting"),
    tagged("IFCDUCTSEGMENT", "IfcDuctSegment"),
    tagged("IFCDUCTFITTING", "IfcDuctFitting"),
    tagged("IFCCABLESEGMENT", "IfcCableSegment"),
    tagged("IFCCABLECARRIERSEGMENT", "IfcCableCarrierSegment"),
    tagged("IFCSANITARYTERMINAL", "IfcSanitaryTerminal"),
    tagged("IFCLIGHTFIXTURE", "IfcLightFixture"),
    tagged("IFCAIRTERMINAL", "IfcAirTerminal"),
    tagged("IFCPUMP", "IfcPump"),
    tagged("IFCFAN", "IfcFan"),
    tagged("IFCVALVE", "IfcValve"),
    tagged("IFCBOILER", "IfcBoiler"),
    tagged("IFCCHILLER", "IfcChiller"),
    tagged("IFCTANK", "IfcTank"),
    tagged("IFCUNITARYEQUIPMENT", "IfcUnitaryEquipment"),
    tagged("IFCELECTRICAPPLIANCE", "IfcElectricAppliance"),
    tagged("IFCOUTLET", "IfcOutlet"),
    tagged("IFCSWITCHINGDEVICE", "IfcSwitchingDevice"),
    tagged("IFCLAMP", "IfcLamp"),
    // Products without a Tag slot at 7
    untagged("IFCANNOTATION", "IfcAnnotation"),
    untagged("IFCGRID", "IfcGrid"),
    // IfcProxy: ProxyType at 7, Tag at 8
    ProductClass {
        keyword: "IFCPROXY",
        class_name: "IfcProxy",
        tag_slot: Some(8),
    },
];

/// Look up the mapping entry for a STEP keyword, if it is a product class.
pub fn product_class(keyword: &str) -> Option<&'static ProductClass> {
    PRODUCT_CLASSES.iter().find(|c| c.keyword == keyword)
}

// Relationship entities covered by the importer.
pub const REL_AGGREGATES: &str = "IFCRELAGGREGATES";
pub const REL_CONNECTS_ELEMENTS: &str = "IFCRELCONNECTSELEMENTS";
pub const REL_DEFINES_BY_PROPERTIES: &str = "IFCRELDEFINESBYPROPERTIES";
pub const REL_CONTAINED_IN_SPATIAL_STRUCTURE: &str = "IFCRELCONTAINEDINSPATIALSTRUCTURE";
pub const REL_ASSIGNS_TO_GROUP: &str = "IFCRELASSIGNSTOGROUP";

// Property resources.
pub const PROPERTY_SET: &str = "IFCPROPERTYSET";
pub const PROPERTY_SINGLE_VALUE: &str = "IFCPROPERTYSINGLEVALUE";

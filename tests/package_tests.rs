//! Package Graph and Codec Tests
//!
//! End-to-end behavior of the public API: manifest import and export,
//! graph algorithms on imported and hand-built packages.

use std::collections::HashSet;

use seda_package::graph::{
    check_cycles, move_unit_tree, normalize_unique_data_object_groups, regenerate_continuous_ids,
    statistics, verify_groups_mergeable, verify_references,
};
use seda_package::metadata::Metadata;
use seda_package::package::DataObjectRef;
use seda_package::{
    ArchiveTransfer, ArchiveUnit, BinaryDataObject, CancellationToken, DataObjectGroup, DataObjectPackage,
    ExportOptions, ImportOptions, PhysicalDataObject, ProgressLogger, SedaError, SedaVersion, UnitLayout,
};

const V: SedaVersion = SedaVersion::V2_1;

fn nested_fixture() -> &'static str {
    include_str!("fixtures/transfer_nested.xml")
}

fn flat_fixture() -> &'static str {
    include_str!("fixtures/transfer_flat.xml")
}

fn import(xml: &str) -> seda_package::Result<ArchiveTransfer> {
    ArchiveTransfer::from_xml(xml, &ImportOptions::default(), &ProgressLogger::new())
}

fn export(transfer: &ArchiveTransfer, layout: UnitLayout, indented: bool) -> String {
    let options = ExportOptions {
        layout,
        indented,
        ..ExportOptions::default()
    };
    transfer.to_xml(&options, &ProgressLogger::new()).unwrap()
}

// =============================================================================
// Import
// =============================================================================

#[test]
fn test_import_nested_manifest() {
    let transfer = import(nested_fixture()).unwrap();
    assert_eq!(transfer.version, SedaVersion::V2_1);

    let global = transfer.global_metadata.as_ref().unwrap();
    assert_eq!(global.comments, vec!["Versement des dossiers de marchés publics"]);
    assert_eq!(global.message_identifier.as_deref(), Some("MSG-2024-0042"));
    assert_eq!(global.archival_agreement.as_deref(), Some("AGR-MARCHES"));
    assert!(global
        .code_list_versions_xml
        .as_deref()
        .unwrap()
        .starts_with("<CodeListVersions>"));
    assert_eq!(global.archival_agency_identifier.as_deref(), Some("AD-75"));
    assert_eq!(global.transferring_agency_identifier.as_deref(), Some("MAIRIE-75"));
    assert!(global
        .transferring_agency_organization_descriptive_metadata_xml
        .as_deref()
        .unwrap()
        .contains("<Name>Mairie</Name>"));

    let pkg = &transfer.package;
    assert_eq!(pkg.unit_count(), 4);
    assert_eq!(pkg.group_count(), 2);
    assert_eq!(pkg.binary_count(), 4);
    assert_eq!(pkg.physical_count(), 1);
    assert_eq!(pkg.roots(), &["ID1"]);
    assert_eq!(pkg.get_unit("ID1").unwrap().children().ids(), &["ID2", "ID10"]);
    assert_eq!(pkg.parents_of("ID3"), vec!["ID2", "ID10"]);

    let declared = pkg.get_group("ID8").unwrap();
    assert_eq!(declared.binaries().ids(), &["ID7"]);
    assert_eq!(declared.physicals().ids(), &["ID9"]);
    assert_eq!(pkg.get_binary("ID11").unwrap().group(), None);

    let binary = pkg.get_binary("ID5").unwrap();
    assert_eq!(binary.size, Some(48213));
    assert_eq!(binary.digest_algorithm.as_deref(), Some("SHA-512"));
    assert_eq!(
        binary.format_identification.as_ref().unwrap().mime_type.as_deref(),
        Some("application/pdf")
    );
    assert!(pkg
        .management_metadata_xml()
        .unwrap()
        .contains("SERV-MARCHES"));
}

#[test]
fn test_imported_metadata_parses_on_demand() {
    let mut transfer = import(nested_fixture()).unwrap();
    let unit = transfer.package.get_unit_mut("ID2").unwrap();

    let content = unit.content(V).unwrap().and_then(Metadata::as_composite).unwrap();
    assert_eq!(content.simple_value("DescriptionLevel").as_deref(), Some("File"));
    let keyword = content.metadata("Keyword").and_then(Metadata::as_composite).unwrap();
    assert_eq!(keyword.simple_value("KeywordContent").as_deref(), Some("voirie"));

    let root = transfer.package.get_unit_mut("ID1").unwrap();
    let management = root.management(V).unwrap().and_then(Metadata::as_composite).unwrap();
    let rule = management
        .metadata("AppraisalRule")
        .and_then(Metadata::as_composite)
        .unwrap();
    assert_eq!(rule.simple_value("Rule").as_deref(), Some("APP-10Y"));
    assert_eq!(rule.simple_value("FinalAction").as_deref(), Some("Keep"));
}

#[test]
fn test_import_flat_manifest() {
    let transfer = import(flat_fixture()).unwrap();
    assert_eq!(transfer.version, SedaVersion::V2_2);
    assert!(transfer.global_metadata.as_ref().unwrap().archival_agency_identifier.is_none());

    let pkg = &transfer.package;
    assert_eq!(pkg.roots(), &["ID12"]);
    assert_eq!(pkg.get_unit("ID12").unwrap().children().ids(), &["ID13", "ID14"]);
    assert_eq!(pkg.get_unit("ID13").unwrap().children().ids(), &["ID14"]);
    assert_eq!(pkg.get_unit("ID14").unwrap().data_objects().ids(), &["ID20"]);
    assert_eq!(pkg.get_physical("ID21").unwrap().group(), Some("ID20"));
}

#[test]
fn test_malformed_header_degrades_to_absent() {
    let xml = nested_fixture().replace(
        "<ArchivalAgreement>AGR-MARCHES</ArchivalAgreement>",
        "<Unexpected>value</Unexpected><ArchivalAgreement>AGR-MARCHES</ArchivalAgreement>",
    );
    let transfer = import(&xml).unwrap();

    let global = transfer.global_metadata.unwrap();
    assert!(global.comments.is_empty());
    assert!(global.date.is_none());
    assert!(global.message_identifier.is_none());
    assert!(global.code_list_versions_xml.is_none());
    assert_eq!(global.archival_agency_identifier.as_deref(), Some("AD-75"));
    assert_eq!(transfer.package.unit_count(), 4);
}

#[test]
fn test_malformed_body_is_fatal() {
    let xml = nested_fixture().replace("<Size>1024</Size>", "<Size>1 Ko</Size>");
    let err = import(&xml).unwrap_err();
    assert!(matches!(err, SedaError::InNode { ref node, .. } if node == "ID7"));
    assert!(matches!(err.root_cause(), SedaError::InvalidValue { .. }));

    let xml = nested_fixture().replace("</DescriptiveMetadata>", "");
    assert!(import(&xml).is_err());
}

#[test]
fn test_dangling_unit_reference_is_reported() {
    let xml = nested_fixture().replace(
        "<ArchiveUnitRefId>ID3</ArchiveUnitRefId>",
        "<ArchiveUnitRefId>ID404</ArchiveUnitRefId>",
    );
    let err = import(&xml).unwrap_err();
    assert!(matches!(err, SedaError::DanglingReference { ref to, .. } if to == "ID404"));
}

#[test]
fn test_closed_schema_rejects_unknown_element() {
    let xml = nested_fixture().replace(
        "<KeywordContent>voirie</KeywordContent>",
        "<KeywordContent>voirie</KeywordContent><Weight>3</Weight>",
    );
    let mut transfer = import(&xml).unwrap();
    let unit = transfer.package.get_unit_mut("ID2").unwrap();
    let err = unit.content(V).unwrap_err();
    assert!(matches!(
        err.root_cause(),
        SedaError::UnknownMetadata { element, .. } if element == "Weight"
    ));
}

#[test]
fn test_cancelled_import() {
    let token = CancellationToken::new();
    token.cancel();
    let progress = ProgressLogger::new().with_token(token);
    let err = ArchiveTransfer::from_xml(nested_fixture(), &ImportOptions::default(), &progress).unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn test_cycle_in_manifest() {
    // ID10 lists itself as a child
    let xml = nested_fixture().replace(
        "<ArchiveUnitRefId>ID3</ArchiveUnitRefId>",
        "<ArchiveUnitRefId>ID10</ArchiveUnitRefId>",
    );
    let err = import(&xml).unwrap_err();
    assert!(matches!(err, SedaError::Cycle { ref path } if path == "ID10 -> ID10"));

    let options = ImportOptions {
        check_cycles: false,
        ..ImportOptions::default()
    };
    let transfer = ArchiveTransfer::from_xml(&xml, &options, &ProgressLogger::new()).unwrap();
    assert_eq!(statistics(&transfer.package).cycle_group_count, 1);
}

// =============================================================================
// Export
// =============================================================================

#[test]
fn test_round_trip_in_both_layouts() {
    let transfer = import(nested_fixture()).unwrap();
    for layout in [UnitLayout::Imbricate, UnitLayout::Flat] {
        for indented in [false, true] {
            let xml = export(&transfer, layout, indented);
            let reread = import(&xml).unwrap();
            assert_eq!(reread, transfer, "layout {} indented {}", layout, indented);
        }
    }
}

#[test]
fn test_imbricate_layout_nests_and_references_repeats() {
    let transfer = import(nested_fixture()).unwrap();
    let xml = export(&transfer, UnitLayout::Imbricate, false);

    assert_eq!(xml.matches("<ArchiveUnit id=\"ID3\">").count(), 1);
    assert!(xml.contains("<ArchiveUnit id=\"REFID1\"><ArchiveUnitRefId>ID3</ArchiveUnitRefId></ArchiveUnit>"));
    let root = xml.find("<ArchiveUnit id=\"ID1\">").unwrap();
    let child = xml.find("<ArchiveUnit id=\"ID2\">").unwrap();
    let end_of_root = xml.rfind("</ArchiveUnit></DescriptiveMetadata>").unwrap();
    assert!(root < child && child < end_of_root);
}

#[test]
fn test_flat_layout_lists_units_once() {
    let transfer = import(nested_fixture()).unwrap();
    let xml = export(&transfer, UnitLayout::Flat, false);

    for id in ["ID1", "ID2", "ID3", "ID10"] {
        assert_eq!(xml.matches(&format!("<ArchiveUnit id=\"{}\">", id)).count(), 1);
    }
    // ID1 -> ID2, ID10; ID2 -> ID3; ID10 -> ID3
    assert_eq!(xml.matches("<ArchiveUnitRefId>").count(), 4);
    assert!(xml.contains("<ArchiveUnit id=\"REFID1\"><ArchiveUnitRefId>ID2</ArchiveUnitRefId></ArchiveUnit>"));
}

#[test]
fn test_export_orders_data_objects() {
    let transfer = import(nested_fixture()).unwrap();
    let xml = export(&transfer, UnitLayout::Imbricate, false);

    let positions: Vec<usize> = [
        "<DataObjectGroup id=\"ID4\">",
        "<DataObjectGroup id=\"ID8\">",
        "<BinaryDataObject id=\"ID11\">",
        "<DescriptiveMetadata>",
        "<ManagementMetadata>",
        "<ArchivalAgency>",
        "<TransferringAgency>",
    ]
    .iter()
    .map(|tag| xml.find(tag).unwrap())
    .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(xml.contains("<Uri>content/ID11.jpg</Uri>"));
}

#[test]
fn test_unmodeled_object_blocks_survive_round_trip() {
    let xml = nested_fixture().replace(
        "<Uri>content/ID6.txt</Uri>\n        <Size>2210</Size>",
        "<Attachment filename=\"notes.txt\">aGVsbG8=</Attachment>\n        <Size>2210</Size>\n        <Compressed algorithm=\"gzip\">true</Compressed>",
    );
    let xml = xml.replace(
        "<BinaryDataObject id=\"ID11\">",
        "<BinaryDataObject id=\"ID11\">\n      <DataObjectSystemId>SYS-11</DataObjectSystemId>",
    );
    let transfer = import(&xml).unwrap();

    let exported = export(&transfer, UnitLayout::Imbricate, false);
    assert!(exported.contains("<Attachment filename=\"notes.txt\">aGVsbG8=</Attachment>"));
    assert!(exported.contains("<Size>2210</Size><Compressed algorithm=\"gzip\">true</Compressed>"));
    assert!(!exported.contains("content/ID6.txt"));
    assert!(exported.contains("<BinaryDataObject id=\"ID11\"><DataObjectSystemId>SYS-11</DataObjectSystemId>"));
    assert_eq!(import(&exported).unwrap(), transfer);
}

#[test]
fn test_export_with_xml_id_attributes() {
    let transfer = import(flat_fixture()).unwrap();
    let options = ExportOptions {
        xml_id_attributes: true,
        version: Some(SedaVersion::V2_3),
        ..ExportOptions::default()
    };
    let xml = transfer.to_xml(&options, &ProgressLogger::new()).unwrap();
    assert!(xml.contains("xmlns=\"fr:gouv:culture:archivesdefrance:seda:v2.3\""));
    assert!(xml.contains("<ArchiveUnit xml:id=\"ID12\">"));
    assert!(!xml.contains(" id=\""));
}

// =============================================================================
// Graph properties
// =============================================================================

#[test]
fn test_scenario_unit_fragment() {
    let mut pkg = DataObjectPackage::new();
    let id = pkg.create_unit();
    let unit = pkg.get_unit_mut(&id).unwrap();
    let content = unit.content_mut(V).unwrap();
    content.add_new_metadata(V, "Title", &["X"]).unwrap();
    content.add_new_metadata(V, "DescriptionLevel", &["Item"]).unwrap();

    let fragment = unit.to_sedaxml_fragments(V).unwrap();
    assert!(fragment.contains("<Content><DescriptionLevel>Item</DescriptionLevel><Title>X</Title></Content>"));
}

#[test]
fn test_scenario_normalization_creates_one_group_per_unit() {
    let mut pkg = DataObjectPackage::new();
    let first = pkg.create_unit();
    let second = pkg.create_unit();
    let a = pkg.add_binary(BinaryDataObject::new()).unwrap();
    let b = pkg.add_binary(BinaryDataObject::new()).unwrap();
    pkg.add_data_object_reference(&first, &a).unwrap();
    pkg.add_data_object_reference(&second, &b).unwrap();

    normalize_unique_data_object_groups(&mut pkg, &ProgressLogger::new()).unwrap();

    assert_eq!(pkg.group_count(), 2);
    let mut groups = HashSet::new();
    for unit_id in [&first, &second] {
        let refs = pkg.get_unit(unit_id).unwrap().data_objects().ids().to_vec();
        assert_eq!(refs.len(), 1);
        let group = pkg.get_group(&refs[0]).unwrap();
        assert_eq!(group.binaries().count(), 1);
        groups.insert(refs[0].clone());
    }
    assert_eq!(groups.len(), 2);
    verify_references(&pkg).unwrap();
}

#[test]
fn test_scenario_impossible_merge_leaves_graph_untouched() {
    let mut pkg = DataObjectPackage::new();
    let first = pkg.create_unit();
    let second = pkg.create_unit();
    let group = pkg.create_group();
    let other = pkg.add_binary(BinaryDataObject::new()).unwrap();
    pkg.add_data_object_reference(&first, &group).unwrap();
    pkg.add_data_object_reference(&second, &group).unwrap();
    pkg.add_data_object_reference(&second, &other).unwrap();
    let before = pkg.clone();

    let err = normalize_unique_data_object_groups(&mut pkg, &ProgressLogger::new()).unwrap_err();
    assert!(matches!(err, SedaError::ImpossibleMerge { .. }));
    assert!(verify_groups_mergeable(&pkg).is_err());
    assert_eq!(pkg, before);
    assert_eq!(pkg.group_count(), 1);
}

#[test]
fn test_scenario_two_unit_cycle() {
    let mut pkg = DataObjectPackage::new();
    let a = pkg.create_unit();
    let b = pkg.create_unit();
    pkg.add_root(&a).unwrap();
    pkg.add_child(&a, &b).unwrap();
    pkg.add_child(&b, &a).unwrap();

    match check_cycles(&pkg).unwrap_err() {
        SedaError::Cycle { path } => assert!(path.contains(&a) && path.contains(&b)),
        other => panic!("expected a cycle, got {:?}", other),
    }
}

#[test]
fn test_ids_stay_unique_across_kinds() {
    let mut pkg = DataObjectPackage::new();
    let mut ids = vec![
        pkg.add_unit(ArchiveUnit::with_id("ID12")).unwrap(),
        pkg.create_unit(),
        pkg.create_group(),
        pkg.add_binary(BinaryDataObject::new()).unwrap(),
        pkg.add_physical(PhysicalDataObject::new()).unwrap(),
        pkg.add_group(DataObjectGroup::new()).unwrap(),
        pkg.create_unit(),
    ];
    assert!(matches!(
        pkg.add_binary(BinaryDataObject::with_id("ID12")),
        Err(SedaError::DuplicateId(_))
    ));
    assert!(matches!(
        pkg.add_group(DataObjectGroup::with_id(ids[3].clone())),
        Err(SedaError::DuplicateId(_))
    ));
    ids.push(pkg.create_group());

    let distinct: HashSet<&String> = ids.iter().collect();
    assert_eq!(distinct.len(), ids.len());
    assert_eq!(ids[1], "ID10");
    assert_eq!(ids[3], "ID13");
}

#[test]
fn test_reference_list_round_trip() {
    let transfer = import(nested_fixture()).unwrap();
    let pkg = &transfer.package;
    let unit = pkg.get_unit("ID1").unwrap();

    let children = unit
        .children()
        .resolve(unit.id(), |id| pkg.get_unit(id))
        .unwrap();
    let ids: Vec<&str> = children.iter().map(|child| child.id()).collect();
    assert_eq!(ids, unit.children().ids());

    let objects = pkg.unit_data_objects("ID10").unwrap();
    assert!(matches!(objects.as_slice(), [DataObjectRef::Group(group)] if group.id() == "ID8"));
}

#[test]
fn test_normalization_is_idempotent() {
    let mut transfer = import(nested_fixture()).unwrap();
    let progress = ProgressLogger::new();

    let first = normalize_unique_data_object_groups(&mut transfer.package, &progress).unwrap();
    assert_eq!(first, 1);
    let once = transfer.package.clone();
    let second = normalize_unique_data_object_groups(&mut transfer.package, &progress).unwrap();
    assert_eq!(second, 0);
    assert_eq!(transfer.package, once);

    let refs = transfer.package.get_unit("ID2").unwrap().data_objects().ids().to_vec();
    assert_eq!(refs.len(), 1);
    assert_eq!(transfer.package.get_group(&refs[0]).unwrap().binaries().ids(), &["ID11"]);
}

#[test]
fn test_normalize_regenerate_and_reimport() {
    let mut transfer = import(nested_fixture()).unwrap();
    normalize_unique_data_object_groups(&mut transfer.package, &ProgressLogger::new()).unwrap();
    regenerate_continuous_ids(&mut transfer.package).unwrap();

    let pkg = &transfer.package;
    assert_eq!(pkg.roots(), &["ID10"]);
    let mut all: Vec<String> = pkg
        .sorted_unit_ids()
        .into_iter()
        .chain(pkg.sorted_group_ids())
        .chain(pkg.sorted_binary_ids())
        .chain(pkg.sorted_physical_ids())
        .collect();
    all.sort_by_key(|id| id[2..].parse::<u64>().unwrap());
    let expected: Vec<String> = (10..10 + all.len() as u64).map(|n| format!("ID{}", n)).collect();
    assert_eq!(all, expected);

    // The reread package starts its counter afresh, so compare the output
    let xml = export(&transfer, UnitLayout::Imbricate, true);
    let reread = import(&xml).unwrap();
    assert_eq!(reread.package.unit_count(), 4);
    assert_eq!(export(&reread, UnitLayout::Imbricate, true), xml);
}

#[test]
fn test_move_subtree_between_imported_packages() {
    let mut src = import(nested_fixture()).unwrap().package;
    let mut dest = import(flat_fixture()).unwrap().package;

    // ID3 is shared by ID2 and ID10, so the ID2 subtree cannot leave alone
    let before = src.clone();
    assert!(matches!(
        move_unit_tree(&mut src, &mut dest, "ID2", None),
        Err(SedaError::StillReferenced { .. })
    ));
    assert_eq!(src, before);

    let moved = move_unit_tree(&mut src, &mut dest, "ID1", Some("ID14")).unwrap();
    assert_eq!(src.unit_count(), 0);
    assert!(src.roots().is_empty());
    assert_eq!(dest.unit_count(), 7);
    assert!(dest.get_unit("ID14").unwrap().children().contains(&moved));
    verify_references(&dest).unwrap();
    check_cycles(&dest).unwrap();
}

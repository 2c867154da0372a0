#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Change detection on content sections, end to end over the pure plan.

use uuid::Uuid;
use vitrine_engine::aggregate::{
    ChildKind, Mutation, Paragraph, Section, SectionPlan, Service, ServiceItem, plan,
};

fn stored_section() -> Section {
    let service_id = Uuid::now_v7();
    Section {
        id: Uuid::now_v7(),
        name: "quinceaneras".into(),
        title: "Quinceañeras".into(),
        image: "quince.webp".into(),
        paragraphs: vec![
            Paragraph {
                id: Some(Uuid::now_v7()),
                order: 1,
                content: "Celebra tus quince".into(),
                ..Default::default()
            },
            Paragraph {
                id: Some(Uuid::now_v7()),
                order: 2,
                content: "Paquetes completos".into(),
                ..Default::default()
            },
        ],
        services: vec![Service {
            id: Some(service_id),
            title: "Banquete".into(),
            price: 3_500_000,
            items: vec![ServiceItem {
                id: Some(Uuid::now_v7()),
                service_id: Some(service_id),
                order: 1,
                price: 0,
                content: "Entrada<=>Plato fuerte<=>Postre".into(),
                content_as_list: true,
                ..Default::default()
            }],
            ..Default::default()
        }],
        version: Some(1),
        ..Default::default()
    }
}

/// Fold a plan's inserts back into the snapshot the way a re-fetch would.
fn refetch(mut section: Section, plan: &SectionPlan) -> Section {
    for mutation in &plan.mutations {
        match mutation {
            Mutation::InsertParagraph {
                id,
                order,
                content,
                ..
            } => section.paragraphs.push(Paragraph {
                id: Some(*id),
                section_id: Some(section.id),
                order: *order,
                content: content.clone(),
                ..Default::default()
            }),
            Mutation::InsertServiceItem {
                id,
                service_id,
                order,
                price,
                content,
                content_as_list,
            } => {
                let service = section
                    .services
                    .iter_mut()
                    .find(|s| s.id == Some(*service_id))
                    .expect("item under known service");
                service.items.push(ServiceItem {
                    id: Some(*id),
                    service_id: Some(*service_id),
                    order: *order,
                    price: *price,
                    content: content.clone(),
                    content_as_list: *content_as_list,
                    ..Default::default()
                });
            }
            _ => {}
        }
    }
    section
}

#[test]
fn resubmitting_unchanged_section_is_a_no_op() {
    let stored = stored_section();
    let first = plan(&stored, &stored.clone());
    assert!(first.is_empty());
    let second = plan(&stored, &stored.clone());
    assert!(second.is_empty());
}

#[test]
fn insert_then_update_touches_only_the_new_child() {
    let stored = stored_section();
    let mut incoming = stored.clone();
    incoming.paragraphs.push(Paragraph {
        order: 3,
        content: "Nuevo".into(),
        ..Default::default()
    });

    let inserted = plan(&stored, &incoming);
    assert_eq!(inserted.inserts(), 1);
    assert_eq!(inserted.updates(), 0);

    let stored = refetch(stored, &inserted);
    let mut edited = stored.clone();
    edited.paragraphs[2].content = "Nuevo, corregido".into();

    let updated = plan(&stored, &edited);
    assert_eq!(updated.mutations.len(), 1);
    let new_id = stored.paragraphs[2].id.unwrap();
    assert!(matches!(
        &updated.mutations[0],
        Mutation::UpdateParagraph { id, content, .. }
            if *id == new_id && content == "Nuevo, corregido"
    ));
}

#[test]
fn orphan_identity_is_neither_inserted_nor_updated() {
    let stored = stored_section();
    let mut incoming = stored.clone();
    let stale = Uuid::now_v7();
    incoming.paragraphs.push(Paragraph {
        id: Some(stale),
        order: 9,
        content: "De otra sección".into(),
        ..Default::default()
    });

    let plan = plan(&stored, &incoming);
    assert!(plan.mutations.is_empty());
    assert_eq!(plan.skipped.len(), 1);
    assert_eq!(plan.skipped[0].kind, ChildKind::Paragraph);
    assert_eq!(plan.skipped[0].id, stale);
}

#[test]
fn removed_children_are_not_deleted() {
    let stored = stored_section();
    let mut incoming = stored.clone();
    incoming.paragraphs.truncate(1);
    incoming.services.clear();
    assert!(plan(&stored, &incoming).is_empty());
}

#[test]
fn reordering_updates_each_moved_child() {
    let stored = stored_section();
    let mut incoming = stored.clone();
    incoming.paragraphs[0].order = 2;
    incoming.paragraphs[1].order = 1;

    let plan = plan(&stored, &incoming);
    assert_eq!(plan.updates(), 2);
    assert!(
        plan.mutations
            .iter()
            .all(|m| matches!(m, Mutation::UpdateParagraph { .. }))
    );
}

#[test]
fn new_item_under_existing_service() {
    let stored = stored_section();
    let mut incoming = stored.clone();
    incoming.services[0].items.push(ServiceItem {
        order: 2,
        price: 15_000,
        content: "Pastel".into(),
        ..Default::default()
    });

    let planned = plan(&stored, &incoming);
    assert_eq!(planned.inserts(), 1);
    let refreshed = refetch(stored, &planned);
    assert_eq!(refreshed.services[0].items.len(), 2);
    assert!(plan(&refreshed, &refreshed.clone()).is_empty());
}

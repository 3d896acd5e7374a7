//! French notification texts shown to the user.

use crm_core::EntityKind;

use crate::notify::Notification;
use crate::sync_queue::ReplayReport;

pub fn created(kind: EntityKind, label: &str) -> Notification {
    Notification::success(
        format!("{} {}", kind.noun(), kind.agree("créé")),
        format!("{} {label} a été {} avec succès.", kind.noun(), kind.agree("créé")),
    )
}

pub fn updated(kind: EntityKind, label: &str) -> Notification {
    Notification::success(
        format!("{} {}", kind.noun(), updated_participle(kind)),
        format!("{} {label} a été {}.", kind.noun(), updated_participle(kind)),
    )
}

pub fn deleted(kind: EntityKind, label: &str) -> Notification {
    Notification::success(
        format!("{} {}", kind.noun(), kind.agree("supprimé")),
        format!("{} {label} a été {}.", kind.noun(), kind.agree("supprimé")),
    )
}

pub fn status_changed(kind: EntityKind, label: &str, status_label: &str) -> Notification {
    Notification::success(
        "Statut mis à jour",
        format!("{} {label} est maintenant « {status_label} ».", kind.noun()),
    )
}

pub fn not_found(kind: EntityKind, id: &str) -> Notification {
    Notification::error(
        "Élément introuvable",
        format!("{} {id} n'existe pas.", kind.noun()),
    )
}

pub fn invalid_transition(kind: EntityKind, label: &str, from: &str, to: &str) -> Notification {
    Notification::error(
        "Changement de statut refusé",
        format!("{} {label} ne peut pas passer de « {from} » à « {to} ».", kind.noun()),
    )
}

pub fn save_failed(detail: &str) -> Notification {
    Notification::error(
        "Erreur de sauvegarde",
        format!("Les modifications n'ont pas pu être enregistrées localement : {detail}"),
    )
}

pub fn operation_refused(detail: &str) -> Notification {
    Notification::error("Opération impossible", detail.to_string())
}

pub fn settings_saved(what: &str) -> Notification {
    Notification::success("Paramètres enregistrés", format!("{what} mis à jour."))
}

pub fn back_online(pending: usize) -> Notification {
    let description = if pending == 0 {
        "La connexion au serveur est rétablie.".to_string()
    } else {
        format!("La connexion au serveur est rétablie, {pending} modification(s) en attente de synchronisation.")
    };
    Notification::info("Connexion rétablie", description)
}

pub fn sync_summary(report: &ReplayReport) -> Notification {
    let mut description = format!("{} modification(s) synchronisée(s)", report.replayed);
    if report.dead_lettered > 0 {
        description.push_str(&format!(", {} en échec", report.dead_lettered));
    }
    if report.remaining > 0 {
        description.push_str(&format!(", {} en attente", report.remaining));
    }
    description.push('.');

    if report.dead_lettered > 0 {
        Notification::warning("Synchronisation incomplète", description)
    } else {
        Notification::success("Synchronisation terminée", description)
    }
}

fn updated_participle(kind: EntityKind) -> &'static str {
    if kind.is_feminine() {
        "mise à jour"
    } else {
        "mis à jour"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationLevel;

    #[test]
    fn participles_agree_with_the_noun() {
        let n = created(EntityKind::Invoice, "FAC-001 (Acme)");
        assert_eq!(n.title, "Facture créée");
        assert_eq!(n.description, "Facture FAC-001 (Acme) a été créée avec succès.");

        let n = deleted(EntityKind::BonLivraison, "BL-002");
        assert_eq!(n.title, "Bon de livraison supprimé");

        let n = updated(EntityKind::Task, "TSK-001 (Relancer)");
        assert_eq!(n.title, "Tâche mise à jour");
        assert_eq!(n.description, "Tâche TSK-001 (Relancer) a été mise à jour.");
    }

    #[test]
    fn sync_summary_warns_on_dead_letters() {
        let report = ReplayReport {
            replayed: 3,
            dead_lettered: 1,
            ..ReplayReport::default()
        };
        let n = sync_summary(&report);
        assert_eq!(n.level, NotificationLevel::Warning);
        assert_eq!(n.description, "3 modification(s) synchronisée(s), 1 en échec.");
    }
}

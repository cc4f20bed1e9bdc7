use crate::session::Role;
use crate::signaling::PeerId;

/// Позиция инициатора в отсортированном списке участников
pub const INITIATOR_INDEX: usize = 1;

/// Детерминированно выбирает роль локального участника.
///
/// Обе стороны видят один и тот же набор id и приходят к одному ответу
/// без обмена сообщениями. `None`, если участников меньше двух или
/// локального id нет в списке.
pub fn elect_role(members: &[PeerId], local_id: &PeerId) -> Option<Role> {
    let mut ids: Vec<&PeerId> = members.iter().collect();
    ids.sort();
    ids.dedup();

    if ids.len() < 2 || !ids.contains(&local_id) {
        return None;
    }

    if ids[INITIATOR_INDEX] == local_id {
        Some(Role::Initiator)
    } else {
        Some(Role::Responder)
    }
}

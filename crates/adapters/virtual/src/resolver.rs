//! Value resolution against the virtual table.

use schedule_state_app::ports::{Resolution, ValueResolver};
use schedule_state_domain::schedule::RawValue;

use crate::VirtualEntities;
use crate::template::{self, Expression};

impl ValueResolver for VirtualEntities {
    fn resolve(&self, raw: &RawValue) -> Resolution {
        let Some(text) = raw.as_str() else {
            return Resolution::literal(raw.clone());
        };
        if !template::is_template(text) {
            return Resolution::literal(raw.clone());
        }
        match template::parse(text) {
            Some(Expression::States(id)) => match self.state(&id) {
                Some(state) => Resolution::literal(state.into()).with_dependencies([id]),
                None => Resolution::failed(format!("unknown entity {id}")).with_dependencies([id]),
            },
            Some(Expression::IsState(id, expected)) => match self.state(&id) {
                Some(state) => {
                    Resolution::literal((state == expected).into()).with_dependencies([id])
                }
                None => Resolution::failed(format!("unknown entity {id}")).with_dependencies([id]),
            },
            Some(Expression::Literal(value)) => Resolution::literal(value.into()),
            None => Resolution::failed(format!("unsupported template {text}")),
        }
    }
}

use diesel::prelude::*;
use lombok::AllArgsConstructor;

#[derive(Queryable, Selectable, Insertable, AllArgsConstructor, Debug, Clone, PartialEq, Eq, Hash)]
#[diesel(table_name = crate::database::schema::follows)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Follow {
    pub user_id: i32,
    pub author_id: i32,
}

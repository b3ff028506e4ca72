use diesel::prelude::*;
use lombok::AllArgsConstructor;

/// One ingredient line of a recipe; the table's serial `id` keeps lines in insertion order.
#[derive(Insertable, AllArgsConstructor, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::database::schema::ingredient_recipes)]
pub struct IngredientRecipe {
    pub recipe_id: i32,
    pub ingredient_id: i32,
    pub amount: f64,
}

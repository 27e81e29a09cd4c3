//! Stages that parse source text columns into typed feature columns.
//!
//! Each stage is a no-op when its source column is absent.

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Int64Array, StringArray};

use super::{map_text, with_columns, PipelineContext, Transform};
use crate::{
    error::Result,
    parse::{
        parse_city_flags, parse_education, parse_experience_months, parse_gender_age,
        parse_has_car, parse_salary, CityFlags, Salary,
    },
};

/// Combined gender and age column.
pub const GENDER_AGE: &str = "Пол, возраст";
/// Salary text column.
pub const SALARY: &str = "ЗП";
/// City plus relocation/travel readiness column.
pub const CITY: &str = "Город";
/// Free-text experience column.
pub const EXPERIENCE: &str = "Опыт (двойное нажатие для полной версии)";
/// Education column.
pub const EDUCATION: &str = "Образование и ВУЗ";
/// Car ownership column.
pub const CAR: &str = "Авто";

/// Source columns whose whitespace is normalized before parsing.
pub const CLEAN_TEXT_COLUMNS: [&str; 12] = [
    GENDER_AGE,
    SALARY,
    "Ищет работу на должность:",
    CITY,
    "Занятость",
    "График",
    EXPERIENCE,
    "Последенее/нынешнее место работы",
    "Последеняя/нынешняя должность",
    EDUCATION,
    "Обновление резюме",
    CAR,
];

fn strings<'a>(values: impl Iterator<Item = Option<&'a str>>) -> ArrayRef {
    Arc::new(values.collect::<StringArray>())
}

fn ints(values: impl Iterator<Item = Option<i64>>) -> ArrayRef {
    Arc::new(values.collect::<Int64Array>())
}

fn bools(values: impl Iterator<Item = Option<bool>>) -> ArrayRef {
    Arc::new(values.collect::<BooleanArray>())
}

/// Splits the gender/age column into `gender` (`M`/`F`) and `age`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseGenderAge;

impl Transform for ParseGenderAge {
    fn apply(&self, mut ctx: PipelineContext) -> Result<PipelineContext> {
        if let Some(parsed) = map_text(&ctx.working, GENDER_AGE, parse_gender_age)? {
            let gender = strings(parsed.iter().map(|(g, _)| g.map(|g| g.as_str())));
            let age = ints(parsed.iter().map(|(_, a)| *a));
            ctx.working = with_columns(&ctx.working, vec![("gender", gender), ("age", age)])?;
        }
        Ok(ctx)
    }
}

/// Derives `salary_value`, `salary_currency` and `salary_rub`.
///
/// `salary_rub` is only filled for ruble amounts; other currencies are left
/// null rather than converted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseSalary;

impl Transform for ParseSalary {
    fn apply(&self, mut ctx: PipelineContext) -> Result<PipelineContext> {
        if let Some(parsed) = map_text(&ctx.working, SALARY, parse_salary)? {
            let value = ints(parsed.iter().map(|s| s.value));
            let currency = strings(parsed.iter().map(|s| s.currency.map(|c| c.as_str())));
            let rub = ints(parsed.iter().map(Salary::rub_value));
            ctx.working = with_columns(
                &ctx.working,
                vec![
                    ("salary_value", value),
                    ("salary_currency", currency),
                    ("salary_rub", rub),
                ],
            )?;
        }
        Ok(ctx)
    }
}

/// Derives `city`, `relocation_ready` and `business_trips_ready`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseCity;

impl Transform for ParseCity {
    fn apply(&self, mut ctx: PipelineContext) -> Result<PipelineContext> {
        if let Some(parsed) = map_text(&ctx.working, CITY, parse_city_flags)? {
            let city = strings(parsed.iter().map(|c: &CityFlags| c.city.as_deref()));
            let relocation = bools(parsed.iter().map(|c| c.relocation));
            let trips = bools(parsed.iter().map(|c| c.business_trips));
            ctx.working = with_columns(
                &ctx.working,
                vec![
                    ("city", city),
                    ("relocation_ready", relocation),
                    ("business_trips_ready", trips),
                ],
            )?;
        }
        Ok(ctx)
    }
}

/// Derives `experience_total_months`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseExperience;

impl Transform for ParseExperience {
    fn apply(&self, mut ctx: PipelineContext) -> Result<PipelineContext> {
        if let Some(parsed) = map_text(&ctx.working, EXPERIENCE, parse_experience_months)? {
            let months = ints(parsed.into_iter());
            ctx.working = with_columns(&ctx.working, vec![("experience_total_months", months)])?;
        }
        Ok(ctx)
    }
}

/// Derives `education_level`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseEducation;

impl Transform for ParseEducation {
    fn apply(&self, mut ctx: PipelineContext) -> Result<PipelineContext> {
        if let Some(parsed) = map_text(&ctx.working, EDUCATION, parse_education)? {
            let level = strings(parsed.iter().map(|l| l.map(|l| l.as_str())));
            ctx.working = with_columns(&ctx.working, vec![("education_level", level)])?;
        }
        Ok(ctx)
    }
}

/// Derives `has_car`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseCar;

impl Transform for ParseCar {
    fn apply(&self, mut ctx: PipelineContext) -> Result<PipelineContext> {
        if let Some(parsed) = map_text(&ctx.working, CAR, parse_has_car)? {
            ctx.working = with_columns(&ctx.working, vec![("has_car", bools(parsed.into_iter()))])?;
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use arrow::{
        array::{Array, AsArray, RecordBatch},
        datatypes::Int64Type,
    };

    use super::*;
    use crate::transform::tests::utf8_batch;

    fn run<T: Transform>(stage: T, batch: RecordBatch) -> RecordBatch {
        stage
            .apply(PipelineContext::new(batch))
            .ok()
            .unwrap_or_else(|| panic!("Should succeed"))
            .working
    }

    fn column<'a>(batch: &'a RecordBatch, name: &str) -> &'a ArrayRef {
        batch
            .column_by_name(name)
            .unwrap_or_else(|| panic!("missing column {name}"))
    }

    #[test]
    fn test_gender_age_columns() {
        let batch = utf8_batch(&[(GENDER_AGE, vec![Some("Мужчина, 33 года"), Some("Женщина"), None])]);
        let out = run(ParseGenderAge, batch);

        let gender = column(&out, "gender").as_string::<i32>();
        assert_eq!(gender.value(0), "M");
        assert_eq!(gender.value(1), "F");
        assert!(gender.is_null(2));

        let age = column(&out, "age").as_primitive::<Int64Type>();
        assert_eq!(age.value(0), 33);
        assert!(age.is_null(1));
        assert!(age.is_null(2));
    }

    #[test]
    fn test_salary_columns() {
        let batch = utf8_batch(&[(
            SALARY,
            vec![Some("27 000 руб."), Some("1 500 USD"), Some("по договоренности")],
        )]);
        let out = run(ParseSalary, batch);

        let value = column(&out, "salary_value").as_primitive::<Int64Type>();
        assert_eq!(value.value(0), 27000);
        assert_eq!(value.value(1), 1500);
        assert!(value.is_null(2));

        let currency = column(&out, "salary_currency").as_string::<i32>();
        assert_eq!(currency.value(0), "RUB");
        assert_eq!(currency.value(1), "USD");
        assert!(currency.is_null(2));

        let rub = column(&out, "salary_rub").as_primitive::<Int64Type>();
        assert_eq!(rub.value(0), 27000);
        assert!(rub.is_null(1));
        assert!(rub.is_null(2));
    }

    #[test]
    fn test_city_columns() {
        let batch = utf8_batch(&[(
            CITY,
            vec![Some("Москва, не готов к переезду, готов к командировкам"), None],
        )]);
        let out = run(ParseCity, batch);

        assert_eq!(column(&out, "city").as_string::<i32>().value(0), "Москва");
        let relocation = column(&out, "relocation_ready").as_boolean();
        assert!(!relocation.value(0));
        assert!(relocation.is_null(1));
        let trips = column(&out, "business_trips_ready").as_boolean();
        assert!(trips.value(0));
        assert!(trips.is_null(1));
    }

    #[test]
    fn test_experience_education_car_columns() {
        let batch = utf8_batch(&[
            (EXPERIENCE, vec![Some("Опыт работы 2 года 3 месяца"), Some("")]),
            (EDUCATION, vec![Some("Высшее образование"), Some("Не указано")]),
            (CAR, vec![Some("Имеется собственный автомобиль"), Some("")]),
        ]);
        let out = run(ParseCar, run(ParseEducation, run(ParseExperience, batch)));

        let months = column(&out, "experience_total_months").as_primitive::<Int64Type>();
        assert_eq!(months.value(0), 27);
        assert!(months.is_null(1));

        let level = column(&out, "education_level").as_string::<i32>();
        assert_eq!(level.value(0), "higher");
        assert!(level.is_null(1));

        let car = column(&out, "has_car").as_boolean();
        assert!(car.value(0));
        assert!(car.is_null(1));
    }

    #[test]
    fn test_absent_source_is_noop() {
        let batch = utf8_batch(&[("unrelated", vec![Some("x")])]);
        let out = run(ParseSalary, batch.clone());
        assert_eq!(out, batch);
        assert!(out.column_by_name("salary_rub").is_none());
    }
}

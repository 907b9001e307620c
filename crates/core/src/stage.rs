use std::fmt;

/// The five ordered phases of the promo-request negotiation.
///
/// The classifier may assign any stage at any time based on model output;
/// nothing enforces sequencing. `Intake` doubles as the fallback when the
/// completion text carries no usable digit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Stage {
    #[default]
    Intake,
    Discount,
    Period,
    Region,
    Confirmation,
}

impl Stage {
    pub fn from_digit(digit: char) -> Option<Self> {
        match digit {
            '1' => Some(Self::Intake),
            '2' => Some(Self::Discount),
            '3' => Some(Self::Period),
            '4' => Some(Self::Region),
            '5' => Some(Self::Confirmation),
            _ => None,
        }
    }

    pub fn digit(&self) -> char {
        match self {
            Self::Intake => '1',
            Self::Discount => '2',
            Self::Period => '3',
            Self::Region => '4',
            Self::Confirmation => '5',
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Intake => "Заявка",
            Self::Discount => "Скидка",
            Self::Period => "Период",
            Self::Region => "Регион",
            Self::Confirmation => "Подтверждение",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.digit(), self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::Stage;

    #[test]
    fn digits_round_trip_through_the_label_table() {
        for stage in [
            Stage::Intake,
            Stage::Discount,
            Stage::Period,
            Stage::Region,
            Stage::Confirmation,
        ] {
            assert_eq!(Stage::from_digit(stage.digit()), Some(stage));
        }
    }

    #[test]
    fn out_of_range_digits_are_rejected() {
        assert_eq!(Stage::from_digit('0'), None);
        assert_eq!(Stage::from_digit('6'), None);
        assert_eq!(Stage::from_digit('x'), None);
    }

    #[test]
    fn default_stage_is_intake() {
        assert_eq!(Stage::default(), Stage::Intake);
        assert_eq!(Stage::Intake.label(), "Заявка");
    }
}

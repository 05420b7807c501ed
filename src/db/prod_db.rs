use crate::db::kobo::ai_ethics_survey::AiEthicsSurveyArchive;

pub struct ProdDb {}

impl ProdDb {
    pub fn ai_ethics_survey() -> AiEthicsSurveyArchive {
        AiEthicsSurveyArchive {
            csv_url: "https://kf.kobotoolbox.org/api/v2/assets/aWiaZSvm6LN3kabZFfNcDm/export-settings/esMcpnfX4xJHguGJm3zdqeW/data.csv"
                .to_string(),
        }
    }
}
